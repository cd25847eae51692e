use serde::{Deserialize, Serialize};

/// The services customers can book, in display order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceCatalog {
    services: Vec<String>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::new(["haircut", "beard trim", "styling"])
    }
}

impl ServiceCatalog {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = vec![];
        for s in services {
            let name = s.as_ref().trim().to_lowercase();
            if !name.is_empty() && !out.contains(&name) {
                out.push(name);
            }
        }
        Self { services: out }
    }

    /// Parses a comma separated list, e.g. `haircut, beard trim, styling`.
    pub fn from_csv(s: &str) -> Self {
        Self::new(s.split(','))
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, service: &str) -> bool {
        let service = service.trim().to_lowercase();
        self.services.iter().any(|s| *s == service)
    }

    /// Finds the service a message talks about. Full names win over the
    /// first-word shorthand (`beard` for `beard trim`).
    pub fn find_in(&self, message: &str) -> Option<&str> {
        let lower = message.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.services
            .iter()
            .find(|s| contains_phrase(&words, s))
            .or_else(|| {
                self.services.iter().find(|s| {
                    s.contains(' ')
                        && s.split_whitespace()
                            .next()
                            .is_some_and(|first| words.contains(&first))
                })
            })
            .map(String::as_str)
    }

    /// `haircut, beard trim, and styling`
    pub fn to_human_readable(&self) -> String {
        match self.services.as_slice() {
            [] => String::new(),
            [one] => one.clone(),
            [a, b] => format!("{a} and {b}"),
            [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
        }
    }
}

fn contains_phrase(words: &[&str], phrase: &str) -> bool {
    let parts: Vec<&str> = phrase.split_whitespace().collect();
    if parts.is_empty() || parts.len() > words.len() {
        return false;
    }
    words.windows(parts.len()).any(|w| w == parts.as_slice())
}
