//! Virtual path algebra.
//!
//! A [`VirtualPath`] addresses a template independently of where its text is
//! stored. Every path is bound to an *application root* (for example `/` or
//! `/MyApp/`) and may start with the root operator `~`, which stands for that
//! application root.
//!
//! # Forms
//!
//! | Form          | Example        | Classification                     |
//! |---------------|----------------|------------------------------------|
//! | empty         | ``             | nothing                            |
//! | relative      | `shared/_a`    | [`VirtualPath::is_relative_path`]  |
//! | root operator | `~/shared/_a`  | [`VirtualPath::has_root_operator`] |
//! | absolute      | `/app/_a.vt`   | [`VirtualPath::is_absolute_path`]  |
//!
//! Normalization resolves `.`/`..` segments and roots relative and
//! root-operator paths at the application root. Ascending above the
//! application root is an error.
//!
//! # Example
//!
//! ```
//! use vellum::vpath::VirtualPath;
//!
//! let mut path = VirtualPath::new("/foo");
//! path.combine_with(["oops/../doo/."]).normalize().unwrap();
//! assert_eq!(path.to_string(), "/foo/doo");
//! assert!(path == "~/doo");
//! ```

use compact_str::CompactString;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// The token that denotes the application root.
pub const ROOT_OPERATOR: &str = "~";

type Segments = SmallVec<[CompactString; 6]>;

/// Path algebra errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path `{path}` ascends above the application root `{root}`")]
    AboveRoot { path: String, root: String },

    #[error("path `{path}` lies outside the application root `{root}`")]
    OutsideRoot { path: String, root: String },

    #[error("an empty path cannot be expressed relative to the application root")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    /// Relative path (or the empty path when there are no segments).
    Relative,
    /// Starts with `/`.
    Rooted,
    /// Starts with `~`.
    RootOperator,
}

/// A mutable virtual path bound to an application root.
///
/// Mutating operations return `&mut Self` (or `Result<&mut Self, _>`) so they
/// can be chained.
#[derive(Debug, Clone)]
pub struct VirtualPath {
    app_root: Segments,
    anchor: Anchor,
    segments: Segments,
    trailing_slash: bool,
}

/// Result of parsing one combine part.
struct Part {
    anchor: Anchor,
    segments: Segments,
    trailing_slash: bool,
}

fn parse_part(part: &str) -> Option<Part> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    let normalized;
    let part = if part.contains('\\') {
        normalized = part.replace('\\', "/");
        normalized.as_str()
    } else {
        part
    };

    let (anchor, rest) = if part == ROOT_OPERATOR {
        (Anchor::RootOperator, "")
    } else if let Some(rest) = part.strip_prefix("~/") {
        (Anchor::RootOperator, rest)
    } else if let Some(rest) = part.strip_prefix('/') {
        (Anchor::Rooted, rest)
    } else {
        (Anchor::Relative, part)
    };

    let segments: Segments = rest
        .split('/')
        .filter(|s| !s.is_empty())
        .map(CompactString::from)
        .collect();
    let trailing_slash = !segments.is_empty() && rest.ends_with('/');

    Some(Part {
        anchor,
        segments,
        trailing_slash,
    })
}

fn parse_root(app_root: &str) -> Segments {
    app_root
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != ROOT_OPERATOR)
        .map(CompactString::from)
        .collect()
}

fn starts_with_ignore_case(segments: &[CompactString], prefix: &[CompactString]) -> bool {
    segments.len() >= prefix.len()
        && segments
            .iter()
            .zip(prefix)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

fn is_dot_segment(segment: &str) -> bool {
    segment == "." || segment == ".."
}

/// Split a segment into `(stem, extension)` when it carries an extension.
fn split_extension(segment: &str) -> Option<(&str, &str)> {
    if is_dot_segment(segment) {
        return None;
    }
    let dot = segment.rfind('.')?;
    (dot > 0 && dot + 1 < segment.len()).then(|| (&segment[..dot], &segment[dot + 1..]))
}

impl VirtualPath {
    /// Create an empty path bound to `app_root`.
    ///
    /// `"/Foo"`, `"/Foo/"` and `"Foo"` all denote the application root `/Foo/`.
    pub fn new(app_root: &str) -> Self {
        Self {
            app_root: parse_root(app_root),
            anchor: Anchor::Relative,
            segments: Segments::new(),
            trailing_slash: false,
        }
    }

    /// Create a path bound to `app_root` and combine it with `path`.
    pub fn parse(app_root: &str, path: &str) -> Self {
        let mut vp = Self::new(app_root);
        vp.combine_with([path]);
        vp
    }

    /// A new empty path bound to the same application root.
    pub fn empty_like(&self) -> Self {
        Self {
            app_root: self.app_root.clone(),
            anchor: Anchor::Relative,
            segments: Segments::new(),
            trailing_slash: false,
        }
    }

    /// A new path bound to the same application root, combined with `path`.
    pub fn sibling(&self, path: &str) -> Self {
        let mut vp = self.empty_like();
        vp.combine_with([path]);
        vp
    }

    /// A copy of this path combined with `part`.
    pub fn join(&self, part: &str) -> Self {
        let mut vp = self.clone();
        vp.combine_with([part]);
        vp
    }

    /// The application root, always with a leading and trailing slash.
    pub fn application_root(&self) -> String {
        let mut root = String::from("/");
        for segment in &self.app_root {
            root.push_str(segment);
            root.push('/');
        }
        root
    }

    /// Number of bytes of the rendered path.
    pub fn len(&self) -> usize {
        self.to_string().len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == Anchor::Relative && self.segments.is_empty()
    }

    /// Reset to the empty path.
    pub fn clear(&mut self) -> &mut Self {
        self.anchor = Anchor::Relative;
        self.segments.clear();
        self.trailing_slash = false;
        self
    }

    /// Path segments, without anchor.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(CompactString::as_str)
    }

    /// Segments below the application root.
    ///
    /// `None` unless the path uses the root operator or is absolute and
    /// located under the application root.
    pub fn segments_under_root(&self) -> Option<Vec<&str>> {
        let skip = match self.anchor {
            Anchor::RootOperator => 0,
            Anchor::Rooted if starts_with_ignore_case(&self.segments, &self.app_root) => {
                self.app_root.len()
            }
            _ => return None,
        };
        Some(self.segments[skip..].iter().map(CompactString::as_str).collect())
    }

    /// Append parts to this path.
    ///
    /// A part that starts with `/` or `~` replaces everything accumulated so
    /// far, the way joining an absolute path onto a relative one does.
    pub fn combine_with<I, S>(&mut self, parts: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for part in parts {
            let Some(part) = parse_part(part.as_ref()) else {
                continue;
            };
            if part.anchor == Anchor::Relative {
                if part.segments.is_empty() {
                    continue;
                }
                self.segments.extend(part.segments);
            } else {
                self.anchor = part.anchor;
                self.segments = part.segments;
            }
            self.trailing_slash = part.trailing_slash;
        }
        self
    }

    /// Resolve `.`/`..` segments and root the path at the application root.
    ///
    /// A relative path that reduces to nothing (such as `.`) becomes the empty
    /// path. The trailing slash is dropped.
    pub fn normalize(&mut self) -> Result<&mut Self, PathError> {
        match self.anchor {
            Anchor::Relative if self.segments.is_empty() => return Ok(self),
            Anchor::Relative => {
                let resolved = self.collapse(&self.segments, 0)?;
                if resolved.is_empty() {
                    return Ok(self.clear());
                }
                let mut segments = self.app_root.clone();
                segments.extend(resolved);
                self.segments = segments;
            }
            Anchor::RootOperator => {
                let resolved = self.collapse(&self.segments, 0)?;
                let mut segments = self.app_root.clone();
                segments.extend(resolved);
                self.segments = segments;
            }
            Anchor::Rooted => {
                let floor = if starts_with_ignore_case(&self.segments, &self.app_root) {
                    self.app_root.len()
                } else {
                    0
                };
                self.segments = self.collapse(&self.segments, floor)?;
            }
        }
        self.anchor = Anchor::Rooted;
        self.trailing_slash = false;
        Ok(self)
    }

    fn collapse(&self, segments: &[CompactString], floor: usize) -> Result<Segments, PathError> {
        let mut stack = Segments::new();
        for segment in segments {
            match segment.as_str() {
                "." => {}
                ".." => {
                    if stack.len() <= floor {
                        return Err(PathError::AboveRoot {
                            path: self.to_string(),
                            root: self.application_root(),
                        });
                    }
                    stack.pop();
                }
                _ => stack.push(segment.clone()),
            }
        }
        Ok(stack)
    }

    /// Rewrite a leading root operator (or a relative path) into an absolute
    /// path under the application root.
    ///
    /// Dot segments are left untouched. Fails when the path is already
    /// absolute but lies outside the application root.
    pub fn resolve_root_operator(&mut self) -> Result<&mut Self, PathError> {
        match self.anchor {
            Anchor::Relative if self.segments.is_empty() => {}
            Anchor::Relative | Anchor::RootOperator => {
                let mut segments = self.app_root.clone();
                segments.extend(self.segments.drain(..));
                self.segments = segments;
                self.anchor = Anchor::Rooted;
            }
            Anchor::Rooted => {
                if !starts_with_ignore_case(&self.segments, &self.app_root) {
                    return Err(PathError::OutsideRoot {
                        path: self.to_string(),
                        root: self.application_root(),
                    });
                }
            }
        }
        Ok(self)
    }

    /// Normalize and express the path relative to the root operator (`~/..`).
    pub fn with_root_operator(&mut self) -> Result<&mut Self, PathError> {
        if self.is_empty() {
            return Err(PathError::Empty);
        }
        self.normalize()?;
        if !starts_with_ignore_case(&self.segments, &self.app_root) {
            return Err(PathError::OutsideRoot {
                path: self.to_string(),
                root: self.application_root(),
            });
        }
        self.segments.drain(..self.app_root.len());
        self.anchor = Anchor::RootOperator;
        Ok(self)
    }

    pub fn has_root_operator(&self) -> bool {
        self.anchor == Anchor::RootOperator
    }

    /// True for paths starting with `/`. Root-operator paths only become
    /// absolute once resolved.
    pub fn is_absolute_path(&self) -> bool {
        self.anchor == Anchor::Rooted
    }

    pub fn is_relative_path(&self) -> bool {
        self.anchor == Anchor::Relative && !self.segments.is_empty()
    }

    /// True for `~/`, and for the absolute path of the application root.
    pub fn is_application_root(&self) -> bool {
        match self.anchor {
            Anchor::RootOperator => self.segments.is_empty(),
            Anchor::Rooted => {
                self.segments.len() == self.app_root.len()
                    && starts_with_ignore_case(&self.segments, &self.app_root)
            }
            Anchor::Relative => false,
        }
    }

    /// Absolute, free of dot segments and located under the application root.
    pub fn is_valid_absolute_path(&self) -> bool {
        self.anchor == Anchor::Rooted
            && starts_with_ignore_case(&self.segments, &self.app_root)
            && !self.segments.iter().any(|s| is_dot_segment(s))
    }

    fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(CompactString::as_str)
    }

    pub fn has_extension(&self) -> bool {
        self.extension().is_some()
    }

    /// The extension of the last segment, without the dot.
    pub fn extension(&self) -> Option<&str> {
        self.last_segment()
            .and_then(split_extension)
            .map(|(_, ext)| ext)
    }

    /// Remove and return the extension of the last segment.
    pub fn strip_extension(&mut self) -> Option<String> {
        let last = self.segments.last_mut()?;
        let (stem, ext) = split_extension(last)?;
        let ext = ext.to_string();
        let stem = CompactString::from(stem);
        *last = stem;
        Some(ext)
    }

    pub fn add_or_replace_extension(&mut self, extension: &str) -> &mut Self {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            return self.remove_extension();
        }
        self.remove_extension();
        if let Some(last) = self.segments.last_mut()
            && !is_dot_segment(last)
        {
            last.push('.');
            last.push_str(extension);
        }
        self
    }

    pub fn add_or_keep_extension(&mut self, extension: &str) -> &mut Self {
        if !self.has_extension() {
            self.add_or_replace_extension(extension);
        }
        self
    }

    pub fn remove_extension(&mut self) -> &mut Self {
        self.strip_extension();
        self
    }

    /// Whether the rendered path ends with `/`.
    ///
    /// With `ignore_root`, the bare roots `/` and `~/` report `false`.
    pub fn has_trailing_slash(&self, ignore_root: bool) -> bool {
        if self.segments.is_empty() {
            self.anchor != Anchor::Relative && !ignore_root
        } else {
            self.trailing_slash
        }
    }

    pub fn append_trailing_slash(&mut self) -> &mut Self {
        if !self.segments.is_empty() {
            self.trailing_slash = true;
        }
        self
    }

    /// Drop the trailing slash. A bare root becomes the empty path unless
    /// `keep_root_slash` is set.
    pub fn remove_trailing_slash(&mut self, keep_root_slash: bool) -> &mut Self {
        if self.segments.is_empty() {
            if !keep_root_slash {
                self.clear();
            }
        } else {
            self.trailing_slash = false;
        }
        self
    }

    /// The first part: `~`, `/segment`, `/` or a bare relative segment.
    pub fn first_part(&self) -> String {
        match self.anchor {
            Anchor::RootOperator => ROOT_OPERATOR.to_string(),
            Anchor::Rooted => match self.segments.first() {
                Some(first) => format!("/{first}"),
                None => "/".to_string(),
            },
            Anchor::Relative => self
                .segments
                .first()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }

    /// Remove and return [`first_part`](Self::first_part).
    pub fn take_first_part(&mut self) -> String {
        let part = self.first_part();
        match self.anchor {
            Anchor::RootOperator => self.anchor = Anchor::Rooted,
            Anchor::Rooted if self.segments.is_empty() => {
                self.clear();
            }
            Anchor::Rooted => {
                self.segments.remove(0);
                if self.segments.is_empty() && !self.trailing_slash {
                    self.clear();
                }
            }
            Anchor::Relative => {
                if !self.segments.is_empty() {
                    self.segments.remove(0);
                }
                if self.segments.is_empty() {
                    self.clear();
                }
            }
        }
        part
    }

    /// The last part: the last segment, or the bare anchor (`/`, `~/`).
    pub fn last_part(&self) -> String {
        match (self.last_segment(), self.anchor) {
            (Some(last), _) => last.to_string(),
            (None, Anchor::RootOperator) => "~/".to_string(),
            (None, Anchor::Rooted) => "/".to_string(),
            (None, Anchor::Relative) => String::new(),
        }
    }

    /// Remove and return [`last_part`](Self::last_part).
    pub fn take_last_part(&mut self) -> String {
        let part = self.last_part();
        if self.segments.pop().is_none() || self.is_empty() {
            self.clear();
        }
        part
    }

    /// The directory containing this path: the path without its last segment.
    ///
    /// Returns `None` for the bare roots and for the empty path.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        parent.trailing_slash = false;
        if parent.is_empty() {
            return None;
        }
        Some(parent)
    }

    /// Case-insensitive key identifying the resolved address.
    ///
    /// Falls back to the raw text when the path cannot be normalized.
    pub(crate) fn key(&self) -> String {
        let mut normalized = self.clone();
        let text = match normalized.normalize() {
            Ok(path) => path.to_string(),
            Err(_) => self.to_string(),
        };
        let text = if text.len() > 1 {
            text.trim_end_matches('/')
        } else {
            text.as_str()
        };
        text.to_ascii_lowercase()
    }

    /// Render in root-operator form when possible, the plain form otherwise.
    pub fn display_virtual(&self) -> String {
        let mut vp = self.clone();
        match vp.with_root_operator() {
            Ok(vp) => vp.to_string(),
            Err(_) => self.to_string(),
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.anchor {
            Anchor::RootOperator => f.write_str("~/")?,
            Anchor::Rooted => f.write_str("/")?,
            Anchor::Relative => {}
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        if self.trailing_slash && !self.segments.is_empty() {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialEq<str> for VirtualPath {
    fn eq(&self, other: &str) -> bool {
        self.key() == self.sibling(other).key()
    }
}

impl PartialEq<&str> for VirtualPath {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_empty(vp: &VirtualPath) {
        assert!(!vp.is_absolute_path());
        assert!(!vp.is_application_root());
        assert!(!vp.is_relative_path());
        assert!(!vp.has_root_operator());
        assert!(!vp.has_extension());
        assert!(!vp.has_trailing_slash(false));
        assert!(!vp.is_valid_absolute_path());
    }

    fn assert_valid_root(vp: &VirtualPath) {
        assert!(vp.is_absolute_path());
        assert!(vp.is_application_root());
        assert!(!vp.is_relative_path());
        assert!(!vp.has_root_operator());
        assert!(!vp.has_extension());
        assert!(!vp.has_trailing_slash(true));
        assert!(vp.is_valid_absolute_path());
    }

    #[test]
    fn test_new_path_is_empty() {
        for root in ["/", "/Foo", "/Foo/"] {
            let vp = VirtualPath::new(root);
            assert_eq!(vp.to_string(), "");
            assert_eq!(vp.application_root(), format!("{}/", root.trim_end_matches('/')).replace("//", "/"));
            assert_eq!(vp.len(), 0);
            assert!(vp == "");
            assert_empty(&vp);
        }
    }

    #[test]
    fn test_current_directory_normalizes_to_empty() {
        for root in ["/", "/Foo", "/Foo/"] {
            let mut vp = VirtualPath::parse(root, ".");
            assert!(vp == "");
            vp.normalize().unwrap();
            assert_empty(&vp);
        }
    }

    #[test]
    fn test_relative_segment_equality_ignores_case() {
        let vp = VirtualPath::parse("/Foo", "doo");
        assert!(vp == "dOO");
        assert!(vp == "DOO");
        let mut vp = vp;
        vp.normalize().unwrap();
        assert_eq!(vp.to_string(), "/Foo/doo");
        assert!(vp.is_valid_absolute_path());
        assert!(!vp.has_trailing_slash(false));
    }

    #[test]
    fn test_parent_of_relative_root_fails() {
        for root in ["/", "/Foo", "/Foo/"] {
            let mut vp = VirtualPath::parse(root, "..");
            assert!(matches!(vp.normalize(), Err(PathError::AboveRoot { .. })));
        }
    }

    #[test]
    fn test_application_root_variants_compare_equal() {
        let mut vp = VirtualPath::parse("/Foo", "/FOO/");
        assert!(vp == "/Foo");
        assert!(vp == "~/");
        assert!(vp == "/foo/");
        vp.normalize().unwrap();
        assert_valid_root(&vp);

        let mut vp = VirtualPath::parse("/", "/");
        assert!(vp == "~/");
        vp.normalize().unwrap();
        assert_valid_root(&vp);
    }

    #[test]
    fn test_clear() {
        let mut vp = VirtualPath::new("/Foo");
        assert_eq!(vp.application_root(), "/Foo/");
        vp.combine_with(["Doo"]);
        assert_eq!(vp.to_string(), "Doo");
        assert_eq!(vp.normalize().unwrap().to_string(), "/Foo/Doo");
        vp.clear();
        assert_eq!(vp.to_string(), "");
        vp.combine_with(["."]);
        assert_eq!(vp.normalize().unwrap().to_string(), "");
    }

    #[test]
    fn test_root_operator() {
        for part in ["~/", "~"] {
            let mut vp = VirtualPath::parse("/", part);
            assert!(vp.has_root_operator());
            assert!(!vp.is_absolute_path());
            assert!(!vp.normalize().unwrap().has_root_operator());
            assert!(vp.is_absolute_path());
            assert!(vp == "/");
            assert!(vp.with_root_operator().unwrap().has_root_operator());
        }

        let mut vp = VirtualPath::parse("/", "~/Foo");
        vp.normalize().unwrap();
        assert!(vp == "/Foo");
        assert_eq!(vp.with_root_operator().unwrap().to_string(), "~/Foo");
    }

    #[test]
    fn test_absolute_paths() {
        let mut vp = VirtualPath::new("/Foo");
        assert!(!vp.is_absolute_path());
        assert!(vp.combine_with(["/Foo/"]).is_absolute_path());
        assert!(vp.clear().combine_with(["/Foo/Doo/Boo"]).is_absolute_path());
        assert!(vp.combine_with(["../.."]) == "/Foo");
        assert!(vp.with_root_operator().unwrap().has_root_operator());

        let vp = VirtualPath::parse("/Foo", "/Doo/Foo");
        assert!(vp.is_absolute_path());
        assert!(!vp.is_valid_absolute_path());
    }

    #[test]
    fn test_is_application_root() {
        let mut vp = VirtualPath::new("/");
        assert!(!vp.is_application_root());
        for part in ["/", "~", "~/"] {
            assert!(vp.clear().combine_with([part]).normalize().unwrap().is_application_root());
        }

        let mut vp = VirtualPath::new("/Foo");
        for part in ["/Foo", "/Foo/", "~", "~/"] {
            assert!(vp.clear().combine_with([part]).normalize().unwrap().is_application_root());
        }
    }

    #[test]
    fn test_is_valid_absolute_path() {
        let mut vp = VirtualPath::new("/Foo");
        let cases = [
            (".", false),
            ("/", false),
            ("/Foo", true),
            ("/Foo/", true),
            ("/Foo2/", false),
            ("~", true),
            ("~/Anything", true),
        ];
        for (part, valid) in cases {
            let normalized = vp.clear().combine_with([part]).normalize().unwrap();
            assert_eq!(normalized.is_valid_absolute_path(), valid, "{part}");
        }
    }

    #[test]
    fn test_relative_paths() {
        let mut vp = VirtualPath::new("/");
        assert!(!vp.is_relative_path());
        assert!(vp.combine_with(["."]).is_relative_path());
        vp.clear().combine_with(["Foo"]);
        assert!(vp.is_relative_path());
        vp.normalize().unwrap();
        assert!(!vp.is_relative_path());
        assert!(vp.is_absolute_path());
    }

    #[test]
    fn test_resolve_root_operator() {
        let mut vp = VirtualPath::new("/");
        assert_eq!(vp.combine_with(["Foo"]).resolve_root_operator().unwrap().to_string(), "/Foo");
        assert_eq!(vp.clear().combine_with(["~/"]).resolve_root_operator().unwrap().to_string(), "/");
        assert_eq!(vp.clear().combine_with(["~"]).resolve_root_operator().unwrap().to_string(), "/");

        let mut vp = VirtualPath::parse("/Foo", "~/Doo");
        assert_eq!(vp.resolve_root_operator().unwrap().to_string(), "/Foo/Doo");
        let result = vp.clear().combine_with(["/Oops"]).resolve_root_operator().map(|_| ());
        assert!(matches!(result, Err(PathError::OutsideRoot { .. })));
    }

    #[test]
    fn test_resolve_root_operator_is_idempotent() {
        for part in ["~/a/b.vt", "a/./b", "/Foo/x", "~"] {
            let mut once = VirtualPath::parse("/Foo", part);
            once.resolve_root_operator().unwrap();
            let mut twice = once.clone();
            twice.resolve_root_operator().unwrap();
            assert_eq!(once.to_string(), twice.to_string(), "{part}");
        }
    }

    #[test]
    fn test_with_root_operator() {
        let mut vp = VirtualPath::new("/Foo");
        assert_eq!(vp.with_root_operator().map(|_| ()), Err(PathError::Empty));
        assert!(vp.combine_with(["/Foo"]).with_root_operator().unwrap() == "~/");
        assert_eq!(
            vp.clear().combine_with(["Doo"]).with_root_operator().unwrap().to_string(),
            "~/Doo"
        );
    }

    #[test]
    fn test_combine_with() {
        let mut vp = VirtualPath::new("/foo");
        vp.combine_with(["oops/../doo/."]).normalize().unwrap();
        assert!(vp == "/foo/doo");

        let mut vp = VirtualPath::new("/foo");
        vp.combine_with(["oops", "..", "doo", ".", "."]).normalize().unwrap();
        assert!(vp == "/foo/doo");

        let mut vp = VirtualPath::new("/foo");
        vp.combine_with(["oops", "..", "doo", ".", ".", "~/"]).normalize().unwrap();
        assert!(vp == "/foo");
        assert!(vp == "~/");
    }

    #[test]
    fn test_combine_twice_with_root() {
        let mut vp = VirtualPath::new("/");
        vp.combine_with(["/"]);
        vp.combine_with(["/"]);
        assert_eq!(vp.to_string(), "/");
    }

    #[test]
    fn test_combine_two_parts() {
        let mut vp = VirtualPath::new("/");
        vp.combine_with(["~/part1", "part2"]).normalize().unwrap();
        assert_eq!(vp.to_string(), "/part1/part2");
        vp.with_root_operator().unwrap();
        assert_eq!(vp.to_string(), "~/part1/part2");
    }

    #[test]
    fn test_dots_collapse_to_root_operator() {
        let mut vp = VirtualPath::new("/");
        vp.combine_with(["/"]).combine_with(["/./././."]);
        vp.normalize().unwrap().with_root_operator().unwrap();
        assert_eq!(vp.to_string(), "~/");

        let mut vp = VirtualPath::new("/");
        vp.combine_with(["/", "/foo/.."]);
        vp.with_root_operator().unwrap();
        assert_eq!(vp.to_string(), "~/");
    }

    #[test]
    fn test_combine_then_normalize_is_valid() {
        let root = VirtualPath::parse("/app", "/app");
        for part in ["/app/a", "/app/a/b/c.vt", "/app/x/../y"] {
            let mut vp = root.clone();
            vp.combine_with([part]).normalize().unwrap();
            assert!(vp.is_valid_absolute_path(), "{part}");
        }
        let mut vp = root.clone();
        assert!(vp.combine_with([".."]).normalize().is_err());
    }

    #[test]
    fn test_extensions() {
        let mut vp = VirtualPath::parse("/", ".");
        assert!(vp == ".");
        assert!(!vp.has_extension());
        assert_eq!(vp.extension(), None);

        vp.clear().combine_with(["~/oops.cshtml"]);
        assert!(vp.has_extension());
        vp.normalize().unwrap();
        assert_eq!(vp.extension(), Some("cshtml"));
        assert_eq!(vp.strip_extension().as_deref(), Some("cshtml"));
        assert!(!vp.has_extension());
        assert_eq!(vp.to_string(), "/oops");
    }

    #[test]
    fn test_add_or_replace_and_keep_extension() {
        let mut vp = VirtualPath::parse("/", "~/t.cs");
        vp.add_or_replace_extension("vb");
        assert_eq!(vp.extension(), Some("vb"));
        vp.clear().combine_with(["foo"]).add_or_replace_extension(".vb");
        assert_eq!(vp.to_string(), "foo.vb");

        let mut vp = VirtualPath::parse("/", "~/t.cs");
        vp.add_or_keep_extension("vb");
        assert_eq!(vp.extension(), Some("cs"));
        vp.clear().combine_with(["foo"]).add_or_keep_extension("vb");
        assert_eq!(vp.extension(), Some("vb"));
    }

    #[test]
    fn test_remove_extension() {
        let mut vp = VirtualPath::new("/");
        vp.remove_extension();
        vp.combine_with(["oops.cs"]);
        assert_eq!(vp.extension(), Some("cs"));
        vp.remove_extension();
        assert_eq!(vp.extension(), None);
    }

    #[test]
    fn test_application_root_carries_no_extension() {
        let mut vp = VirtualPath::parse("/", "~/");
        vp.add_or_replace_extension("vt");
        assert_eq!(vp.to_string(), "~/");
        assert!(!vp.has_extension());
    }

    #[test]
    fn test_first_part() {
        let mut vp = VirtualPath::parse("/foo", "~/app/path/");
        assert_eq!(vp.first_part(), "~");
        assert_eq!(vp.take_first_part(), "~");
        assert_eq!(vp.first_part(), "/app");
        assert_eq!(vp.take_first_part(), "/app");
        assert_eq!(vp.first_part(), "/path");
        assert_eq!(vp.take_first_part(), "/path");
        assert_eq!(vp.take_first_part(), "/");

        let mut vp = VirtualPath::parse("/foo", "~/app/path/");
        vp.normalize().unwrap();
        assert_eq!(vp.take_first_part(), "/foo");
        assert_eq!(vp.take_first_part(), "/app");
        assert_eq!(vp.take_first_part(), "/path");
        assert_eq!(vp.take_first_part(), "");
    }

    #[test]
    fn test_last_part() {
        let mut vp = VirtualPath::parse("/foo", "~/app/path/");
        assert_eq!(vp.last_part(), "path");
        assert_eq!(vp.take_last_part(), "path");
        assert_eq!(vp.take_last_part(), "app");
        assert_eq!(vp.last_part(), "~/");
        assert_eq!(vp.take_last_part(), "~/");
        assert_eq!(vp.take_last_part(), "");

        let mut vp = VirtualPath::parse("/foo", "~/app/path/");
        vp.normalize().unwrap();
        assert_eq!(vp.take_last_part(), "path");
        assert_eq!(vp.take_last_part(), "app");
        assert_eq!(vp.take_last_part(), "foo");
        assert_eq!(vp.take_last_part(), "/");
    }

    #[test]
    fn test_trailing_slash() {
        let mut vp = VirtualPath::parse("/", "/");
        vp.normalize().unwrap();
        assert!(vp.has_trailing_slash(false));
        assert!(!vp.has_trailing_slash(true));
        assert!(vp.clear().combine_with(["/foo/"]).has_trailing_slash(false));
        assert!(!vp.clear().combine_with(["/foo"]).has_trailing_slash(false));

        let mut vp = VirtualPath::parse("/", "/");
        assert_eq!(vp.append_trailing_slash().to_string(), "/");
        vp.clear().combine_with(["/foo"]).append_trailing_slash();
        assert_eq!(vp.to_string(), "/foo/");

        let mut vp = VirtualPath::parse("/", "/");
        assert_eq!(vp.remove_trailing_slash(false).to_string(), "");
        vp.clear().combine_with(["/"]).remove_trailing_slash(true);
        assert_eq!(vp.to_string(), "/");
    }

    #[test]
    fn test_parent() {
        let vp = VirtualPath::parse("/", "/a/b/c.vt");
        assert_eq!(vp.parent().unwrap().to_string(), "/a/b");
        assert_eq!(VirtualPath::parse("/", "/a").parent().unwrap().to_string(), "/");
        assert!(VirtualPath::parse("/", "/").parent().is_none());
    }

    #[test]
    fn test_display_virtual() {
        let vp = VirtualPath::parse("/app", "/app/Child2.vt");
        assert_eq!(vp.display_virtual(), "~/Child2.vt");
        let outside = VirtualPath::parse("/app", "/elsewhere/x");
        assert_eq!(outside.display_virtual(), "/elsewhere/x");
    }
}
