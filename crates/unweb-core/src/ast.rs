//! Contract for externally-provided syntax analysis.
//!
//! Comment stripping and declaration-name extraction require real lexical
//! knowledge of JavaScript (strings, template literals, regex literals).
//! That machinery lives outside this crate; fingerprinting only needs these
//! two pure operations, so they are expressed as a trait the embedding
//! application implements and injects.

/// Pure syntax operations used by fingerprinting.
///
/// Implementations must be deterministic: the normalized hash of a package
/// version is only comparable across runs if `strip_comments` produces the
/// same output for the same input every time.
pub trait SyntaxAnalyzer: Send + Sync {
    /// Remove all comments from `source` while respecting string, template,
    /// and regex literals. Whitespace handling is the caller's concern.
    fn strip_comments(&self, source: &str) -> String;

    /// Names of top-level and nested declarations (functions, classes,
    /// `const`/`let`/`var` bindings) in `source`, in encounter order.
    /// Duplicates are fine; the caller dedupes.
    fn declaration_names(&self, source: &str) -> Vec<String>;
}

impl<T: SyntaxAnalyzer + ?Sized> SyntaxAnalyzer for &T {
    fn strip_comments(&self, source: &str) -> String {
        (**self).strip_comments(source)
    }

    fn declaration_names(&self, source: &str) -> Vec<String> {
        (**self).declaration_names(source)
    }
}

impl<T: SyntaxAnalyzer + ?Sized> SyntaxAnalyzer for std::sync::Arc<T> {
    fn strip_comments(&self, source: &str) -> String {
        (**self).strip_comments(source)
    }

    fn declaration_names(&self, source: &str) -> Vec<String> {
        (**self).declaration_names(source)
    }
}
