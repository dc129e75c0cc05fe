use super::{ClassReport, ClassRewriter, Error, Observer, Settings};
use crate::archive::{self, Entry};
use crate::jvm;
use crate::jvm::class_file::ClassFile;
use crate::jvm::class_graph::{ClassHierarchy, ClassInfo, LibraryClasses};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fmt;
use std::path::Path;

/// Counts of what happened to the entries of an archive
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub entries: usize,

    /// Classes written back with different bytes
    pub rewritten_classes: usize,

    /// Directories and entries that aren't class files
    pub passthrough_entries: usize,

    /// Class files copied unchanged because they could not be processed
    pub failed_classes: usize,

    /// Methods that kept their original code
    pub failed_methods: usize,

    pub substitutions: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries: {} classes rewritten, {} passed through, {} classes failed, {} methods \
             failed, {} substitutions",
            self.entries,
            self.rewritten_classes,
            self.passthrough_entries,
            self.failed_classes,
            self.failed_methods,
            self.substitutions
        )
    }
}

/// Entry after the first pass
enum Parsed {
    Passthrough(Entry),
    Class(Entry, ClassFile),
    Failed(Entry),
}

/// Entry after the second pass
enum Outcome {
    Passthrough,
    Class { rewritten: bool, report: ClassReport },
    Failed(ClassReport),
}

/// Rewrite a JAR on disk
///
/// The output is only created once every entry has been processed. Failures in individual
/// classes are reported to the observer and never fail the run.
pub fn replace_jar(
    input: &Path,
    output: &Path,
    settings: &Settings,
    observer: &dyn Observer,
) -> Result<Summary, Error> {
    settings.validate()?;

    let entries = archive::read_jar(input)?;
    log::debug!("Read {} entries from {}", entries.len(), input.display());

    let mut hierarchy = ClassHierarchy::new();
    if !settings.libraries.is_empty() {
        let libraries = LibraryClasses::open(&settings.libraries)?;
        log::debug!("Resolving classes from {} libraries", libraries.len());
        hierarchy.add_lookup(Box::new(libraries));
    }

    let (entries, summary) = process_entries(entries, settings, hierarchy, observer)?;
    archive::write_jar(output, &entries)?;
    log::info!("{}", summary);
    Ok(summary)
}

/// Rewrite the class files among archive entries
///
/// Entries come back in the order they were given. Anything that isn't a class file (judged by
/// its contents, not its name) is passed through untouched, as is every class that could not be
/// processed. Classes in `entries` are added to `hierarchy` before any of them get rewritten.
pub fn process_entries(
    entries: Vec<Entry>,
    settings: &Settings,
    mut hierarchy: ClassHierarchy,
    observer: &dyn Observer,
) -> Result<(Vec<Entry>, Summary), Error> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(settings.threads.get())
        .build()?;
    let mut summary = Summary {
        entries: entries.len(),
        ..Summary::default()
    };

    let parsed: Vec<Parsed> = pool.install(|| {
        entries
            .into_par_iter()
            .map(|entry| parse_entry(entry, observer))
            .collect()
    });

    for item in &parsed {
        if let Parsed::Class(_, class) = item {
            // Already extracted once while parsing, so this can't fail
            if let Ok(info) = ClassInfo::from_class(class) {
                hierarchy.add_class(info);
            }
        }
    }
    log::debug!("{} classes in the archive", hierarchy.local_len());

    let rewriter = ClassRewriter::new(settings, &hierarchy, observer);
    let processed: Vec<(Entry, Outcome)> = pool.install(|| {
        parsed
            .into_par_iter()
            .map(|item| rewrite_entry(item, &rewriter, settings, observer))
            .collect()
    });

    let mut entries = Vec::with_capacity(processed.len());
    for (entry, outcome) in processed {
        match outcome {
            Outcome::Passthrough => summary.passthrough_entries += 1,
            Outcome::Class { rewritten, report } => {
                if rewritten {
                    summary.rewritten_classes += 1;
                }
                summary.substitutions += report.substitutions;
                summary.failed_methods += report.failed_methods;
            }
            Outcome::Failed(report) => {
                summary.failed_classes += 1;
                summary.failed_methods += report.failed_methods;
            }
        }
        entries.push(entry);
    }
    Ok((entries, summary))
}

fn parse_entry(entry: Entry, observer: &dyn Observer) -> Parsed {
    if entry.is_directory {
        return Parsed::Passthrough(entry);
    }
    let class = ClassFile::parse(&entry.bytes)
        .and_then(|class| ClassInfo::from_class(&class).map(|_| class));
    match class {
        Ok(class) => Parsed::Class(entry, class),
        Err(jvm::Error::NotAClassFile) => Parsed::Passthrough(entry),
        Err(err) => {
            observer.class_failed(&entry.name, &err);
            Parsed::Failed(entry)
        }
    }
}

fn rewrite_entry(
    item: Parsed,
    rewriter: &ClassRewriter,
    settings: &Settings,
    observer: &dyn Observer,
) -> (Entry, Outcome) {
    let (mut entry, mut class) = match item {
        Parsed::Passthrough(entry) => return (entry, Outcome::Passthrough),
        Parsed::Failed(entry) => return (entry, Outcome::Failed(ClassReport::default())),
        Parsed::Class(entry, class) => (entry, class),
    };
    let unchanged = |report| Outcome::Class {
        rewritten: false,
        report,
    };

    match class.name() {
        Ok(name) if settings.matches_class(name) => (),
        _ => return (entry, unchanged(ClassReport::default())),
    }

    let report = match rewriter.rewrite(&mut class, &mut rand::thread_rng()) {
        Ok(report) => report,
        Err(err) => {
            observer.class_failed(&entry.name, &err);
            return (entry, Outcome::Failed(ClassReport::default()));
        }
    };
    if !report.changed {
        return (entry, unchanged(report));
    }

    match class.to_bytes() {
        Ok(bytes) => {
            log::trace!("Rewrote {} ({} bytes)", entry.name, bytes.len());
            entry.bytes = bytes;
            let outcome = Outcome::Class {
                rewritten: true,
                report,
            };
            (entry, outcome)
        }
        Err(err) => {
            observer.class_failed(&entry.name, &err);
            (entry, Outcome::Failed(report))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::replace::observer::test::Recorder;
    use crate::replace::{Policy, Rules};
    use std::num::NonZeroUsize;

    fn settings() -> Settings {
        let mut rules = Rules::new();
        rules
            .insert("%%KEY%%", Policy::Literal(String::from("X")))
            .unwrap();
        let mut settings = Settings::new(rules);
        settings.threads = NonZeroUsize::new(2).unwrap();
        settings
    }

    #[test]
    fn non_class_entries_pass_through() {
        let entries = vec![
            Entry::directory("META-INF/"),
            Entry::file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n".to_vec()),
            Entry::file("Fake.class", b"not a class %%KEY%%".to_vec()),
            Entry::file("empty", vec![]),
        ];
        let recorder = Recorder::default();
        let (output, summary) =
            process_entries(entries.clone(), &settings(), ClassHierarchy::new(), &recorder)
                .unwrap();
        assert_eq!(output, entries);
        assert_eq!(
            summary,
            Summary {
                entries: 4,
                passthrough_entries: 4,
                ..Summary::default()
            }
        );
        assert!(recorder.failed_classes.lock().unwrap().is_empty());
    }

    #[test]
    fn truncated_classes_are_copied() {
        let mut truncated = ClassFile::MAGIC.to_be_bytes().to_vec();
        truncated.extend_from_slice(&[0, 0, 0, 52, 0]);
        let entries = vec![Entry::file("com/x/Broken.class", truncated)];
        let recorder = Recorder::default();
        let (output, summary) =
            process_entries(entries.clone(), &settings(), ClassHierarchy::new(), &recorder)
                .unwrap();
        assert_eq!(output, entries);
        assert_eq!(summary.failed_classes, 1);
        assert_eq!(
            *recorder.failed_classes.lock().unwrap(),
            vec![String::from("com/x/Broken.class")]
        );
    }

    #[test]
    fn summary_line() {
        let summary = Summary {
            entries: 5,
            rewritten_classes: 2,
            passthrough_entries: 1,
            failed_classes: 1,
            failed_methods: 0,
            substitutions: 3,
        };
        assert_eq!(
            summary.to_string(),
            "5 entries: 2 classes rewritten, 1 passed through, 1 classes failed, 0 methods \
             failed, 3 substitutions"
        );
    }
}
