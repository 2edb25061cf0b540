//! error accumulation
//!
//! Some validations report every problem they find instead of stopping at the first one.
//! [ErrorList] collects those; [ErrorList::finalize] must be called to turn it into a result.

/// Accumulator for collect-all validation
#[derive(Debug)]
#[must_use = "call finalize() to report the collected errors"]
pub struct ErrorList<E> {
    errors: Vec<E>,
}

impl<E> Default for ErrorList<E> {
    fn default() -> Self {
        Self { errors: vec![] }
    }
}

impl<E: std::fmt::Debug> ErrorList<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: E) {
        tracing::trace!(?error, "error collected");
        self.errors.push(error);
    }

    /// Add the error of `result`, if any, and return its value
    pub fn add_result<T>(&mut self, result: Result<T, E>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.add(error);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok` when nothing was collected, otherwise all errors in insertion order
    pub fn finalize(self) -> Result<(), Vec<E>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Render a list of errors one per line
pub(crate) fn display_list<E: std::fmt::Display>(
    errors: &[E],
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    for (idx, error) in errors.iter().enumerate() {
        if idx > 0 {
            f.write_str("\n")?;
        }
        write!(f, "{error}")?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_list_finalizes_ok() {
        let errs: ErrorList<String> = ErrorList::new();
        assert!(errs.finalize().is_ok());
    }

    #[test]
    fn keeps_insertion_order() {
        let mut errs = ErrorList::new();
        errs.add("first");
        assert_eq!(errs.add_result(Ok::<_, &str>(1)), Some(1));
        assert_eq!(errs.add_result(Err::<i32, _>("second")), None);
        assert_eq!(errs.finalize().unwrap_err(), vec!["first", "second"]);
    }
}
