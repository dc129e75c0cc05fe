mod common;

use common::*;
use jar_string_replacer::archive::{self, Entry};
use jar_string_replacer::jvm::class_file::{
    ClassFile, CodeAttribute, CodeAttributeBody, LineNumber, Version,
};
use jar_string_replacer::jvm::class_graph::ClassHierarchy;
use jar_string_replacer::jvm::code::opcodes::*;
use jar_string_replacer::jvm::code::{Code, ExceptionHandler, Instruction, Label, LocalForm};
use jar_string_replacer::jvm::{ClassConstantIndex, ConstantIndex};
use jar_string_replacer::replace::{self, Policy, Rules, Settings, Summary};
use std::fs;

fn settings(key: &str, policy: Policy) -> Settings {
    let mut rules = Rules::new();
    rules.insert(key, policy).unwrap();
    Settings::new(rules)
}

fn literal(key: &str, value: &str) -> Settings {
    settings(key, Policy::Literal(value.to_owned()))
}

fn process(entries: Vec<Entry>, settings: &Settings, observer: &Recording) -> (Vec<Entry>, Summary) {
    replace::process_entries(entries, settings, ClassHierarchy::new(), observer).unwrap()
}

#[test]
fn substitution() {
    let mut builder = ClassBuilder::new("com/x/Foo", Version::JAVA7);
    builder.constant_method("greet", "hello %%KEY%%!");
    builder.constant_method("other", "unrelated");
    let entries = vec![class_entry("com/x/Foo", builder.to_bytes())];

    let recording = Recording::default();
    let (output, summary) = process(entries, &literal("%%KEY%%", "X"), &recording);
    assert_eq!(summary.rewritten_classes, 1);
    assert_eq!(summary.substitutions, 1);

    let class = ClassFile::parse(&output[0].bytes).unwrap();
    assert_eq!(
        loaded_strings(&class),
        vec![vec![String::from("hello X!")], vec![String::from("unrelated")]]
    );
    assert_eq!(
        *recording.substitutions.lock().unwrap(),
        vec![String::from(
            "com/x/Foo.greet()Ljava/lang/String;: %%KEY%% -> X"
        )]
    );
}

#[test]
fn filter_scoping() {
    let mut foo = ClassBuilder::new("com/x/Foo", Version::JAVA7);
    foo.constant_method("get", "%%KEY%%");
    let mut bar = ClassBuilder::new("com/x/Bar", Version::JAVA7);
    bar.constant_method("get", "%%KEY%%");
    let bar_bytes = bar.to_bytes();
    let entries = vec![
        class_entry("com/x/Foo", foo.to_bytes()),
        class_entry("com/x/Bar", bar_bytes.clone()),
    ];

    let mut settings = literal("%%KEY%%", "X");
    settings.class_filter = Some(String::from("Foo"));
    let recording = Recording::default();
    let (output, summary) = process(entries, &settings, &recording);
    assert_eq!(summary.rewritten_classes, 1);

    let foo = ClassFile::parse(&output[0].bytes).unwrap();
    assert_eq!(loaded_strings(&foo), vec![vec![String::from("X")]]);
    assert_eq!(output[1].bytes, bar_bytes);
}

#[test]
fn passthrough_and_isolation() {
    let mut entries = vec![
        Entry::directory("META-INF/"),
        Entry::file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\n".to_vec()),
        Entry::file("config.yml", b"user: %%KEY%%\n".to_vec()),
    ];

    // Valid magic number, garbage after it
    let mut malformed = ClassFile::MAGIC.to_be_bytes().to_vec();
    malformed.extend_from_slice(&[0, 0, 0, 52, 0xFF, 0xFF, 1, 2, 3]);
    entries.push(Entry::file("com/x/Broken.class", malformed));

    for idx in 0..5 {
        let name = format!("com/x/Good{}", idx);
        let mut builder = ClassBuilder::new(&name, Version::JAVA7);
        builder.constant_method("get", "%%KEY%%");
        entries.push(class_entry(&name, builder.to_bytes()));
    }

    let recording = Recording::default();
    let (output, summary) = process(entries.clone(), &literal("%%KEY%%", "X"), &recording);
    assert_eq!(
        summary,
        Summary {
            entries: 9,
            rewritten_classes: 5,
            passthrough_entries: 3,
            failed_classes: 1,
            failed_methods: 0,
            substitutions: 5,
        }
    );
    assert_eq!(
        *recording.failed_classes.lock().unwrap(),
        vec![String::from("com/x/Broken.class")]
    );

    assert_eq!(output.len(), entries.len());
    assert_eq!(output[..4], entries[..4]);
    for (input, output) in entries[4..].iter().zip(&output[4..]) {
        assert_eq!(input.name, output.name);
        let class = ClassFile::parse(&output.bytes).unwrap();
        assert_eq!(loaded_strings(&class), vec![vec![String::from("X")]]);
    }
}

#[test]
fn round_trip_without_substitutions() {
    let mut builder = ClassBuilder::new("com/x/Foo", Version::JAVA7);
    builder.pick_method("a", "b");
    builder.constant_method("get", "c");
    let bytes = builder.to_bytes();

    let class = ClassFile::parse(&bytes).unwrap();
    assert_eq!(class.to_bytes().unwrap(), bytes);
    assert_eq!(ClassFile::parse(&class.to_bytes().unwrap()).unwrap(), class);
}

#[test]
fn widening_relocates_code() {
    let mut builder = ClassBuilder::new("com/x/Foo", Version::JAVA7);
    builder.pick_method("a", "id=%%KEY%%");
    builder.fill_constant_pool();
    let entries = vec![class_entry("com/x/Foo", builder.to_bytes())];

    let recording = Recording::default();
    let (output, summary) = process(entries, &settings("%%KEY%%", Policy::RandomInt), &recording);
    assert_eq!(summary.rewritten_classes, 1);
    assert!(recording.failed_methods.lock().unwrap().is_empty());

    let class = ClassFile::parse(&output[0].bytes).unwrap();
    let strings = loaded_strings(&class);
    let id = strings[0][1].strip_prefix("id=").unwrap();
    assert!(id.parse::<i32>().is_ok());

    // The second `ldc` became an `ldc_w`, pushing the `areturn` back by one byte
    let code = class.methods[0].code().unwrap();
    assert_eq!(code.source_offsets, vec![0, 1, 4, 6, 9, 12, 13]);
    assert!(code.instructions[4].ldc_index().unwrap().0 > 255);
    assert!(matches!(
        code.instructions[4],
        Instruction::Ldc { wide: true, .. }
    ));
    assert_eq!(
        code.instructions[1],
        Instruction::Branch {
            opcode: IFEQ,
            target: Label(4)
        }
    );
    assert_eq!(
        code.instructions[3],
        Instruction::Branch {
            opcode: GOTO,
            target: Label(5)
        }
    );

    let lines = code
        .attribute(CodeAttribute::LINE_NUMBER_TABLE, &class.constants)
        .unwrap();
    assert_eq!(
        lines.body,
        CodeAttributeBody::LineNumberTable(vec![
            LineNumber {
                start: Label(0),
                line_number: 1
            },
            LineNumber {
                start: Label(2),
                line_number: 2
            },
            LineNumber {
                start: Label(4),
                line_number: 3
            },
        ])
    );

    // `same_frame` at offset 9, then `same_locals_1_stack_item_frame` holding a `String` at 12
    let frames = code
        .attribute(CodeAttribute::STACK_MAP_TABLE, &class.constants)
        .unwrap();
    let bytes = match &frames.body {
        CodeAttributeBody::Opaque(bytes) => bytes,
        other => panic!("expected raw stack map table, got {:?}", other),
    };
    assert_eq!(&bytes[..5], &[0u8, 2, 9, 64 + 2, 7]);
    let class_index = ClassConstantIndex(ConstantIndex(u16::from_be_bytes([bytes[5], bytes[6]])));
    assert_eq!(
        class.constants.get_class_name(class_index).unwrap(),
        "java/lang/String"
    );
    assert_eq!(bytes.len(), 7);
}

#[test]
fn unknown_exceptions_merge_to_throwable() {
    // static String guarded() { try { return "%%KEY%%"; } catch (FirstFailure | SecondFailure e) { return null; } }
    let mut builder = ClassBuilder::new("com/x/Foo", Version::JAVA7);
    let index = builder.string("%%KEY%%");
    let first = builder.class("org/lib/FirstFailure");
    let second = builder.class("org/lib/SecondFailure");
    let handler = |catch_type| ExceptionHandler {
        start: Label(0),
        end: Label(1),
        handler: Label(2),
        catch_type: Some(catch_type),
    };
    let code = Code {
        max_stack: 1,
        max_locals: 1,
        instructions: vec![
            Instruction::Ldc { index, wide: false },
            Instruction::Simple(ARETURN),
            Instruction::Local {
                opcode: ASTORE,
                index: 0,
                form: LocalForm::Short,
            },
            Instruction::Simple(ACONST_NULL),
            Instruction::Simple(ARETURN),
        ],
        source_offsets: vec![],
        exception_table: vec![handler(first), handler(second)],
        attributes: vec![],
    };
    builder.method("guarded", "()Ljava/lang/String;", true, code);
    builder.fill_constant_pool();
    let entries = vec![class_entry("com/x/Foo", builder.to_bytes())];

    let recording = Recording::default();
    let (output, summary) = process(entries, &literal("%%KEY%%", "X"), &recording);
    assert_eq!(summary.rewritten_classes, 1);
    assert_eq!(summary.failed_methods, 0);

    // One `same_locals_1_stack_item_frame` at the handler, which moved from offset 3 to 4
    let class = ClassFile::parse(&output[0].bytes).unwrap();
    let code = class.methods[0].code().unwrap();
    assert_eq!(code.source_offsets, vec![0, 3, 4, 5, 6, 7]);
    let frames = code
        .attribute(CodeAttribute::STACK_MAP_TABLE, &class.constants)
        .unwrap();
    let bytes = match &frames.body {
        CodeAttributeBody::Opaque(bytes) => bytes,
        other => panic!("expected raw stack map table, got {:?}", other),
    };
    assert_eq!(&bytes[..4], &[0u8, 1, 64 + 4, 7]);
    let class_index = ClassConstantIndex(ConstantIndex(u16::from_be_bytes([bytes[4], bytes[5]])));
    assert_eq!(
        class.constants.get_class_name(class_index).unwrap(),
        "java/lang/Throwable"
    );
}

#[test]
fn old_classes_keep_no_frames() {
    let mut builder = ClassBuilder::new("com/x/Foo", Version { major: 49, minor: 0 });
    builder.pick_method("%%KEY%%", "b");
    builder.fill_constant_pool();
    let entries = vec![class_entry("com/x/Foo", builder.to_bytes())];

    let recording = Recording::default();
    let (output, _) = process(entries, &literal("%%KEY%%", "X"), &recording);
    let class = ClassFile::parse(&output[0].bytes).unwrap();
    let code = class.methods[0].code().unwrap();
    assert_eq!(code.source_offsets, vec![0, 1, 4, 7, 10, 12, 13]);
    assert!(code
        .attribute(CodeAttribute::STACK_MAP_TABLE, &class.constants)
        .is_none());
    assert_eq!(loaded_strings(&class)[0], vec!["X", "b"]);
}

#[test]
fn unverifiable_methods_keep_their_code() {
    let mut builder = ClassBuilder::new("com/x/Foo", Version::JAVA7);
    builder.constant_method("get", "%%KEY%%");
    let index = builder.string("%%KEY%%");
    let dead_code = Code {
        max_stack: 1,
        max_locals: 0,
        instructions: vec![
            Instruction::Ldc { index, wide: false },
            Instruction::Simple(ARETURN),
            Instruction::Simple(ACONST_NULL),
            Instruction::Simple(ARETURN),
        ],
        source_offsets: vec![],
        exception_table: vec![],
        attributes: vec![],
    };
    builder.method("dead", "()Ljava/lang/String;", true, dead_code);
    builder.fill_constant_pool();
    let entries = vec![class_entry("com/x/Foo", builder.to_bytes())];

    let recording = Recording::default();
    let (output, summary) = process(entries, &literal("%%KEY%%", "X"), &recording);
    assert_eq!(summary.rewritten_classes, 1);
    assert_eq!(summary.failed_methods, 1);
    assert_eq!(summary.substitutions, 1);
    assert_eq!(
        *recording.failed_methods.lock().unwrap(),
        vec![String::from("com/x/Foo.dead()Ljava/lang/String;")]
    );

    let class = ClassFile::parse(&output[0].bytes).unwrap();
    assert_eq!(
        loaded_strings(&class),
        vec![vec![String::from("X")], vec![String::from("%%KEY%%")]]
    );
    assert_eq!(class.methods[1].code().unwrap().source_offsets, vec![0, 2, 3, 4, 5]);
}

#[test]
fn jar_on_disk() {
    let dir = std::env::temp_dir().join(format!("jar-string-replacer-it-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    let input = dir.join("in.jar");
    let output = dir.join("out.jar");

    let mut builder = ClassBuilder::new("com/x/Plugin", Version::JAVA7);
    builder.constant_method("user", "%%__USER__%%");
    let entries = vec![
        Entry::directory("com/"),
        Entry::directory("com/x/"),
        class_entry("com/x/Plugin", builder.to_bytes()),
        Entry::file("plugin.yml", b"name: Plugin\n".to_vec()),
    ];
    archive::write_jar(&input, &entries).unwrap();

    let mut rules = Rules::new();
    rules.insert_spigot_placeholders(1.0).unwrap();
    let settings = Settings::new(rules);
    let recording = Recording::default();
    let summary = replace::replace_jar(&input, &output, &settings, &recording).unwrap();
    assert_eq!(summary.rewritten_classes, 1);
    assert_eq!(summary.passthrough_entries, 3);

    let rewritten = archive::read_jar(&output).unwrap();
    let names: Vec<&str> = rewritten.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(names, vec!["com/", "com/x/", "com/x/Plugin.class", "plugin.yml"]);
    assert!(rewritten[0].is_directory);
    assert_eq!(rewritten[3], entries[3]);
    let class = ClassFile::parse(&rewritten[2].bytes).unwrap();
    assert_eq!(loaded_strings(&class), vec![vec![String::from("1111")]]);

    // Configuration problems are caught before the input is even opened
    let missing = dir.join("missing.jar");
    let empty = Settings::new(Rules::new());
    assert!(matches!(
        replace::replace_jar(&missing, &output, &empty, &recording),
        Err(replace::Error::Configuration(_))
    ));
    assert!(matches!(
        replace::replace_jar(&missing, &output, &settings, &recording),
        Err(replace::Error::Io(_))
    ));

    fs::remove_dir_all(&dir).unwrap();
}
