//! Entry-name deduplication.
//!
//! An archive with two identical entry names extracts unpredictably, so the
//! encoder routes every incoming name through a deduplication policy before
//! emitting the entry's local header. The policy is a stateful transducer:
//! one archive, one instance, one output name per input name, all outputs
//! pairwise distinct.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;

/// Stateful mapping from incoming entry names to unique archive names.
///
/// `accept` is called once per entry, in emission order, and must return a
/// name distinct from every name it returned before. Implementations are
/// single-use: one instance serves exactly one archive. A failure aborts
/// the archive.
pub trait NameDeduplicator: Send {
    fn accept(&mut self, name: &str) -> Result<String>;
}

/// Rebuilds a name from its split parts: base path, disambiguation index
/// (`0` means "no suffix"), and optional extension.
pub type NameReconstructor = fn(path: &str, index: u64, extension: Option<&str>) -> String;

/// Pattern behind [`DefaultDeduplicator`]: lazy base path (slashes stay in
/// the path), optional ` (N)` disambiguator, optional extension split at
/// the first dot of the base name.
pub const DEFAULT_NAME_PATTERN: &str = r"^((?:.*/)?.*?)(?: \((\d+)\))?(?:\.(.*?))?$";

/// Renders `path`, then ` (index)` when the index is non-zero, then
/// `.extension` when one is present.
pub fn default_name_reconstructor(path: &str, index: u64, extension: Option<&str>) -> String {
    let mut name = String::from(path);
    if index > 0 {
        name.push_str(" (");
        name.push_str(&index.to_string());
        name.push(')');
    }
    if let Some(extension) = extension {
        name.push('.');
        name.push_str(extension);
    }
    name
}

/// Per-path deduplication state.
///
/// `counter` is the highest index handed out by probing (`-1` before the
/// first); `absorbed` holds indices that arrived pre-disambiguated (e.g.
/// an incoming `"foo (3).txt"`) so probing skips over them instead of
/// colliding.
struct PathSlot {
    counter: i64,
    absorbed: BTreeSet<i64>,
}

/// The standard deduplication policy.
///
/// Splits each name with the pattern, keeps an explicit ` (N)` suffix when
/// it is still free, and otherwise probes upward from the path's counter,
/// skipping absorbed indices. Index `0` renders with no suffix, so the
/// first occurrence of a name passes through unchanged.
///
/// ```
/// use zipstream::{DefaultDeduplicator, NameDeduplicator};
///
/// let mut dedup = DefaultDeduplicator::default();
/// assert_eq!(dedup.accept("a.txt").unwrap(), "a.txt");
/// assert_eq!(dedup.accept("a.txt").unwrap(), "a (1).txt");
/// assert_eq!(dedup.accept("a.txt").unwrap(), "a (2).txt");
/// ```
pub struct DefaultDeduplicator {
    pattern: Regex,
    reconstruct: NameReconstructor,
    collected: HashMap<(String, Option<String>), PathSlot>,
}

impl DefaultDeduplicator {
    pub fn new(pattern: Regex, reconstruct: NameReconstructor) -> Self {
        Self {
            pattern,
            reconstruct,
            collected: HashMap::new(),
        }
    }

    /// Split a name into `(path, index, extension)`.
    ///
    /// An absent index is the sentinel `-1`, never `0`: the distinction
    /// between "no suffix" and an explicit ` (0)` survives the round trip
    /// through the reconstructor. A name the pattern rejects (or an index
    /// too large for `i64`) is treated whole as the path.
    fn split<'a>(&self, name: &'a str) -> (&'a str, i64, Option<&'a str>) {
        let Some(captures) = self.pattern.captures(name) else {
            return (name, -1, None);
        };
        let path = captures.get(1).map_or(name, |m| m.as_str());
        let index = match captures.get(2) {
            Some(m) => match m.as_str().parse::<i64>() {
                Ok(value) => value,
                Err(_) => return (name, -1, None),
            },
            None => -1,
        };
        let extension = captures.get(3).map(|m| m.as_str());
        (path, index, extension)
    }
}

impl Default for DefaultDeduplicator {
    fn default() -> Self {
        let pattern = Regex::new(DEFAULT_NAME_PATTERN).expect("default name pattern compiles");
        Self::new(pattern, default_name_reconstructor)
    }
}

impl NameDeduplicator for DefaultDeduplicator {
    fn accept(&mut self, name: &str) -> Result<String> {
        let (path, index, extension) = self.split(name);

        let slot = self
            .collected
            .entry((path.to_string(), extension.map(str::to_string)))
            .or_insert_with(|| PathSlot {
                counter: -1,
                absorbed: BTreeSet::new(),
            });

        let new_index;
        if index > slot.counter && !slot.absorbed.contains(&index) {
            // An explicit suffix beyond everything handed out so far:
            // keep it, remember it so probing skips it later.
            new_index = index;
            slot.absorbed.insert(new_index);
        } else {
            let mut candidate = slot.counter + 1;
            while slot.absorbed.remove(&candidate) {
                candidate += 1;
            }
            slot.counter = candidate;
            new_index = candidate;
        }

        if index == new_index {
            Ok(name.to_string())
        } else {
            Ok((self.reconstruct)(path, new_index as u64, extension))
        }
    }
}

type DeduplicatorFactory = dyn Fn() -> Box<dyn NameDeduplicator> + Send + Sync;

/// Deduplication configuration for one archive.
///
/// Deduplicators are stateful and single-use, so the custom variant carries
/// a factory rather than an instance: every archive produced from the same
/// configuration (notably through [`zip_stream_resource`]) gets a fresh
/// deduplicator.
///
/// [`zip_stream_resource`]: crate::zip_stream_resource
#[derive(Default)]
pub enum Deduplication {
    /// [`DefaultDeduplicator`] with the standard pattern and reconstructor.
    #[default]
    Default,
    /// A caller-supplied policy; see [`Deduplication::custom`].
    Custom(Arc<DeduplicatorFactory>),
    /// Emit incoming names verbatim. Duplicates become the caller's
    /// responsibility; the encoder does not reject them.
    Disabled,
}

impl Deduplication {
    /// Wrap a factory producing a custom policy.
    pub fn custom<F, D>(factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: NameDeduplicator + 'static,
    {
        Deduplication::Custom(Arc::new(move || Box::new(factory()) as Box<dyn NameDeduplicator>))
    }

    /// Build the deduplicator instance for one archive.
    pub(crate) fn instantiate(&self) -> Option<Box<dyn NameDeduplicator>> {
        match self {
            Deduplication::Default => Some(Box::<DefaultDeduplicator>::default()),
            Deduplication::Custom(factory) => Some(factory()),
            Deduplication::Disabled => None,
        }
    }
}

impl Clone for Deduplication {
    fn clone(&self) -> Self {
        match self {
            Deduplication::Default => Deduplication::Default,
            Deduplication::Custom(factory) => Deduplication::Custom(Arc::clone(factory)),
            Deduplication::Disabled => Deduplication::Disabled,
        }
    }
}

/// Configure the default policy with a custom pattern and reconstructor.
///
/// The pattern must expose the same three capture groups as
/// [`DEFAULT_NAME_PATTERN`]; a fresh deduplicator is instantiated for each
/// archive.
pub fn default_deduplicator(pattern: Regex, reconstruct: NameReconstructor) -> Deduplication {
    Deduplication::custom(move || DefaultDeduplicator::new(pattern.clone(), reconstruct))
}
