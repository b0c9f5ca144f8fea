use std::{collections::BTreeMap, fmt};

///
/// ErrorTree
///
/// Validation messages grouped by schema path. The empty path holds
/// messages that apply to the schema as a whole.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorTree {
    messages: BTreeMap<String, Vec<String>>,
}

impl ErrorTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: impl fmt::Display) {
        self.add_at("", message);
    }

    pub fn add_at(&mut self, path: impl Into<String>, message: impl fmt::Display) {
        self.messages
            .entry(path.into())
            .or_default()
            .push(message.to_string());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }

    /// Messages recorded against one path.
    #[must_use]
    pub fn get(&self, path: &str) -> &[String] {
        self.messages.get(path).map_or(&[], Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.messages
            .iter()
            .flat_map(|(path, msgs)| msgs.iter().map(move |m| (path.as_str(), m.as_str())))
    }

    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (path, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            first = false;

            if path.is_empty() {
                write!(f, "{message}")?;
            } else {
                write!(f, "{path}: {message}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for ErrorTree {}

/// Record a formatted message against a path in an [`ErrorTree`].
#[macro_export]
macro_rules! err {
    ($errs:expr, at = $path:expr, $($arg:tt)*) => {
        $errs.add_at($path, format!($($arg)*))
    };
    ($errs:expr, $($arg:tt)*) => {
        $errs.add(format!($($arg)*))
    };
}
