use super::{Error, Policy, Rules};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

pub struct Settings {
    /// Only classes whose binary name contains this are rewritten (eg. `Foo` matches `com/x/Foo`)
    pub class_filter: Option<String>,

    /// Replacement rules, applied in order
    pub rules: Rules,

    /// Archives used to look up classes that aren't in the archive being processed
    ///
    /// These only ever inform the common superclass computation for stack map frames. Nothing in
    /// them gets rewritten.
    pub libraries: Vec<PathBuf>,

    /// Number of worker threads processing classes
    pub threads: NonZeroUsize,
}

impl Settings {
    pub fn new(rules: Rules) -> Settings {
        Settings {
            class_filter: None,
            rules,
            libraries: vec![],
            threads: thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Add rules from flat `placeholder replacement` pairs
    pub fn insert_pairs<S: AsRef<str>>(&mut self, pairs: &[S], probability: f64) -> Result<(), Error> {
        if pairs.len() % 2 != 0 {
            return Err(Error::Configuration(format!(
                "expected placeholder and replacement pairs, but got {} arguments",
                pairs.len()
            )));
        }
        let probability = check_probability(probability)?;
        for pair in pairs.chunks(2) {
            let policy = Policy::parse(pair[1].as_ref(), probability);
            self.rules.insert(pair[0].as_ref(), policy)?;
        }
        Ok(())
    }

    /// Check the settings are usable before touching any archive
    pub fn validate(&self) -> Result<(), Error> {
        if self.rules.is_empty() {
            return Err(Error::Configuration(String::from(
                "no placeholders to replace",
            )));
        }
        if matches!(&self.class_filter, Some(filter) if filter.is_empty()) {
            return Err(Error::Configuration(String::from(
                "class filter must not be empty",
            )));
        }
        for rule in self.rules.iter() {
            if let Policy::OrigOrFixed { probability, .. } = rule.policy {
                check_probability(probability)?;
            }
        }
        Ok(())
    }

    /// Should the class with this binary name be rewritten?
    pub fn matches_class(&self, class_name: &str) -> bool {
        match &self.class_filter {
            Some(filter) => class_name.contains(filter.as_str()),
            None => true,
        }
    }
}

/// Probabilities must be within `[0, 1]`
pub fn check_probability(probability: f64) -> Result<f64, Error> {
    if (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(Error::Configuration(format!(
            "probability {} is not between 0 and 1",
            probability
        )))
    }
}
