use crate::jvm;

/// One occurrence of a placeholder that got replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution<'a> {
    /// Binary name of the class (eg. `com/x/Foo`)
    pub class: &'a str,
    pub method: &'a str,
    pub method_descriptor: &'a str,
    pub key: &'a str,
    pub replacement: &'a str,
}

/// Receives everything worth reporting while an archive is processed
///
/// Called concurrently from the worker threads.
pub trait Observer: Sync {
    fn substituted(&self, substitution: &Substitution);

    /// A class entry could not be rewritten and was copied unchanged
    fn class_failed(&self, entry_name: &str, error: &jvm::Error);

    /// A method kept its original code (the rest of its class may still have been rewritten)
    fn method_failed(&self, class: &str, method: &str, method_descriptor: &str, error: &jvm::Error);
}

/// Report through the `log` crate
pub struct LogObserver;

impl Observer for LogObserver {
    fn substituted(&self, substitution: &Substitution) {
        log::info!(
            "Replaced {} in {}.{}{} with {}",
            substitution.key,
            substitution.class,
            substitution.method,
            substitution.method_descriptor,
            substitution.replacement
        );
    }

    fn class_failed(&self, entry_name: &str, error: &jvm::Error) {
        log::warn!("Failed to rewrite {}, copying it unchanged: {}", entry_name, error);
    }

    fn method_failed(&self, class: &str, method: &str, method_descriptor: &str, error: &jvm::Error) {
        log::warn!(
            "Keeping original code of {}.{}{}: {}",
            class,
            method,
            method_descriptor,
            error
        );
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::sync::Mutex;

    /// Observer that remembers everything it saw
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub(crate) substitutions: Mutex<Vec<(String, String, String)>>,
        pub(crate) failed_classes: Mutex<Vec<String>>,
        pub(crate) failed_methods: Mutex<Vec<String>>,
    }

    impl Observer for Recorder {
        fn substituted(&self, substitution: &Substitution) {
            self.substitutions.lock().unwrap().push((
                substitution.class.to_owned(),
                format!("{}{}", substitution.method, substitution.method_descriptor),
                substitution.replacement.to_owned(),
            ));
        }

        fn class_failed(&self, entry_name: &str, _error: &jvm::Error) {
            self.failed_classes.lock().unwrap().push(entry_name.to_owned());
        }

        fn method_failed(&self, class: &str, method: &str, method_descriptor: &str, _error: &jvm::Error) {
            self.failed_methods
                .lock()
                .unwrap()
                .push(format!("{}.{}{}", class, method, method_descriptor));
        }
    }
}
