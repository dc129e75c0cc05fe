use super::Error;
use rand::Rng;
use std::borrow::Cow;

/// How the text matched by a rule gets replaced
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    /// Always the same text
    Literal(String),

    /// Decimal form of a random `i32`, drawn again for every occurrence
    RandomInt,

    /// Either `fixed` (with the given probability) or the matched text itself
    ///
    /// The choice is made independently for every occurrence.
    OrigOrFixed { fixed: String, probability: f64 },
}

impl Policy {
    /// Probability used by `%<fixed>|orig%` values when none is given
    pub const DEFAULT_PROBABILITY: f64 = 0.5;

    /// Interpret a replacement value
    ///
    ///   - `%int%` is a random integer
    ///   - `%<fixed>|orig%` is either `<fixed>` or the original text
    ///   - anything else is used as is
    pub fn parse(value: &str, probability: f64) -> Policy {
        if value == "%int%" {
            return Policy::RandomInt;
        }
        match value
            .strip_prefix('%')
            .and_then(|value| value.strip_suffix("|orig%"))
        {
            Some(fixed) => Policy::OrigOrFixed {
                fixed: fixed.to_owned(),
                probability,
            },
            None => Policy::Literal(value.to_owned()),
        }
    }

    /// Text to put in place of one occurrence of `key`
    pub fn replacement<'a, R: Rng>(&'a self, key: &'a str, rng: &mut R) -> Cow<'a, str> {
        match self {
            Policy::Literal(value) => Cow::Borrowed(value),
            Policy::RandomInt => Cow::Owned(rng.gen::<i32>().to_string()),
            Policy::OrigOrFixed { fixed, probability } => {
                if rng.gen_bool(*probability) {
                    Cow::Borrowed(fixed)
                } else {
                    Cow::Borrowed(key)
                }
            }
        }
    }
}

/// Replace every occurrence of `key` in `text` by `policy`
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub key: String,
    pub policy: Policy,
}

/// One occurrence of a rule key that got substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement<'a> {
    pub key: &'a str,
    pub replacement: String,
}

/// Outcome of running all the rules over some text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite<'a> {
    pub text: String,
    pub replacements: Vec<Replacement<'a>>,
}

impl<'a> Rewrite<'a> {
    /// Did the text end up different from what it was?
    pub fn changed(&self, original: &str) -> bool {
        self.text != original
    }
}

/// Ordered set of rules
///
/// Rules are applied one after another: a later rule sees the text produced by the earlier ones.
/// Adding a rule for a key that is already present replaces that rule's policy but keeps its
/// position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rules(Vec<Rule>);

/// SpigotMC download placeholders and the values the presets substitute for them
pub const SPIGOT_PLACEHOLDERS: [(&str, &str); 3] = [
    ("%%__USER__%%", "1111"),
    ("%%__RESOURCE__%%", "2222"),
    ("%%__NONCE__%%", "3333"),
];

impl Rules {
    pub fn new() -> Rules {
        Rules(vec![])
    }

    pub fn insert(&mut self, key: impl Into<String>, policy: Policy) -> Result<(), Error> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::Configuration(String::from(
                "placeholders must not be empty",
            )));
        }
        match self.0.iter_mut().find(|rule| rule.key == key) {
            Some(rule) => rule.policy = policy,
            None => self.0.push(Rule { key, policy }),
        }
        Ok(())
    }

    /// Add the SpigotMC placeholders, replaced with the given probability
    ///
    /// A probability of 1 replaces them with literals.
    pub fn insert_spigot_placeholders(&mut self, probability: f64) -> Result<(), Error> {
        for (key, fixed) in SPIGOT_PLACEHOLDERS {
            let policy = if probability >= 1.0 {
                Policy::Literal(fixed.to_owned())
            } else {
                Policy::OrigOrFixed {
                    fixed: fixed.to_owned(),
                    probability,
                }
            };
            self.insert(key, policy)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.0.iter()
    }

    /// Run every rule over the text
    pub fn rewrite<R: Rng>(&self, text: &str, rng: &mut R) -> Rewrite<'_> {
        let mut current = text.to_owned();
        let mut replacements = vec![];

        for rule in &self.0 {
            if !current.contains(&rule.key) {
                continue;
            }

            let mut next = String::with_capacity(current.len());
            let mut last_end = 0;
            for (start, matched) in current.match_indices(&rule.key) {
                let replacement = rule.policy.replacement(&rule.key, rng);
                next.push_str(&current[last_end..start]);
                next.push_str(&replacement);
                last_end = start + matched.len();
                replacements.push(Replacement {
                    key: &rule.key,
                    replacement: replacement.into_owned(),
                });
            }
            next.push_str(&current[last_end..]);
            current = next;
        }

        Rewrite {
            text: current,
            replacements,
        }
    }
}
