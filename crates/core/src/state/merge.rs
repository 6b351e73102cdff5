//! Identity keyed merge of labels, providers and artifact lists
//!
//! All merges follow the same rule: entries of the overlay replace entries
//! of the base with the same key in place, new entries are appended in
//! overlay order.

use super::component::{Artifact, Element};
use crate::meta::{Label, Provider};

/// Merge `overlay` labels into `base`, keyed by label name
pub fn merge_labels(base: &[Label], overlay: &[Label]) -> Vec<Label> {
    let mut result = base.to_vec();
    for label in overlay {
        match result.iter().position(|l| l.name == label.name) {
            Some(index) => result[index] = label.clone(),
            None => result.push(label.clone()),
        }
    }
    result
}

/// Merge an optional provider override into an optional base provider.
///
/// A missing base is an empty provider. The override name wins when it is
/// not empty, labels are merged.
pub fn merge_provider(base: Option<&Provider>, overlay: Option<&Provider>) -> Provider {
    let mut provider = base.cloned().unwrap_or_default();
    if let Some(overlay) = overlay {
        if !overlay.name.is_empty() {
            provider.name = overlay.name.clone();
        }
        provider.labels = merge_labels(&provider.labels, &overlay.labels);
    }
    provider
}

/// Merge `overlay` elements into `base` by identity.
///
/// The optional hook runs on every overlay element before it is compared.
pub fn merge_elements<E>(base: &[E], overlay: Vec<E>, hook: Option<&dyn Fn(&mut E)>) -> Vec<E>
where
    E: Element + Clone,
{
    if overlay.is_empty() {
        return base.to_vec();
    }

    let mut result = base.to_vec();
    for mut element in overlay {
        if let Some(hook) = hook {
            hook(&mut element);
        }
        let identity = element.identity();
        match result.iter().position(|e| e.identity() == identity) {
            Some(index) => result[index] = element,
            None => result.push(element),
        }
    }
    result
}

/// Merge artifacts, stamping each overlay artifact with its source file
pub fn merge_artifacts<E>(base: &[E], overlay: Vec<E>, source_file: &str) -> Vec<E>
where
    E: Artifact + Clone,
{
    let stamp: &dyn Fn(&mut E) = &|e: &mut E| e.set_source_file(source_file);
    merge_elements(base, overlay, Some(stamp))
}
