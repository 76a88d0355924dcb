use std::collections::{BTreeMap, HashMap};
use std::hash::{BuildHasher, Hash};

/// Shallow merge of a partial value into a full state.
///
/// `merge` must not modify `self`; it builds the next snapshot from the
/// current one with every field present in `partial` taking precedence.
///
/// # Examples
///
/// ```
/// use snapstore::{Merge, Store};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Form {
///     name: String,
///     age: u32,
/// }
///
/// #[derive(Default)]
/// struct FormPatch {
///     name: Option<String>,
///     age: Option<u32>,
/// }
///
/// impl Merge for Form {
///     type Partial = FormPatch;
///
///     fn merge(&self, patch: FormPatch) -> Self {
///         Form {
///             name: patch.name.unwrap_or_else(|| self.name.clone()),
///             age: patch.age.unwrap_or(self.age),
///         }
///     }
/// }
///
/// let store = Store::new(Form { name: "ada".into(), age: 36 });
/// store.merge(FormPatch { age: Some(37), ..Default::default() });
/// assert_eq!(store.get(), Form { name: "ada".into(), age: 37 });
/// ```
pub trait Merge {
    /// The partial value accepted by [`Merge::merge`].
    type Partial;

    /// Build the next state from `self` overlaid with `partial`.
    fn merge(&self, partial: Self::Partial) -> Self;
}

impl<K, V, H> Merge for HashMap<K, V, H>
where
    K: Eq + Hash + Clone,
    V: Clone,
    H: BuildHasher + Clone,
{
    type Partial = HashMap<K, V, H>;

    fn merge(&self, partial: Self::Partial) -> Self {
        let mut next = self.clone();
        next.extend(partial);
        next
    }
}

impl<K, V> Merge for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    type Partial = BTreeMap<K, V>;

    fn merge(&self, partial: Self::Partial) -> Self {
        let mut next = self.clone();
        next.extend(partial);
        next
    }
}
