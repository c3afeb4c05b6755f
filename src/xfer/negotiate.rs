//! Mechanism negotiation.
//!
//! Picks one mechanism per edge of the element chain before any data
//! moves. Each element advertises coupled upstream/downstream pairings,
//! so the choice on one edge constrains the next; the search walks the
//! chain left to right and backtracks when a later edge has no
//! compatible pairing.

use crate::element::{Element, Mechanism};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Choose one mechanism per edge of the chain.
///
/// The returned vector has one entry per edge (`elements.len() - 1`
/// entries). Candidates on each edge are tried most preferred first,
/// per [`Mechanism::preference`], with the pairing weights from both
/// sides breaking ties, so the first full assignment found is the best
/// one.
pub(crate) fn negotiate(elements: &[Arc<dyn Element>]) -> Result<Vec<Mechanism>> {
    if elements.len() < 2 {
        return Err(Error::Config(
            "a transfer needs at least a source and a destination".to_string(),
        ));
    }

    let first = elements[0].as_ref();
    if !first.mech_pairs().iter().any(|p| p.upstream == Mechanism::None) {
        return Err(Error::Config(format!(
            "element '{}' cannot be a source",
            first.name()
        )));
    }

    let mut chosen = Vec::with_capacity(elements.len() - 1);
    if !search(elements, 0, Mechanism::None, &mut chosen) {
        // The search is exhaustive, so on failure report the tightest
        // pair it could not bridge: the leftmost edge is as good a
        // pointer as any for the caller.
        return Err(Error::Config(format!(
            "no compatible mechanism chain through elements {}",
            elements
                .iter()
                .map(|e| format!("'{}'", e.name()))
                .collect::<Vec<_>>()
                .join(" -> ")
        )));
    }

    for (i, mech) in chosen.iter().enumerate() {
        debug!(
            upstream = elements[i].name(),
            downstream = elements[i + 1].name(),
            mechanism = %mech,
            "negotiated edge"
        );
    }
    Ok(chosen)
}

/// Extend the assignment for `elements[idx..]`, where `incoming` is the
/// mechanism already fixed on `elements[idx]`'s upstream side.
fn search(
    elements: &[Arc<dyn Element>],
    idx: usize,
    incoming: Mechanism,
    chosen: &mut Vec<Mechanism>,
) -> bool {
    let elt = elements[idx].as_ref();
    let last = idx == elements.len() - 1;

    let mut candidates: Vec<_> = elt
        .mech_pairs()
        .into_iter()
        .filter(|p| p.upstream == incoming)
        .filter(|p| !last || p.downstream == Mechanism::None)
        .collect();
    candidates.sort_by(|a, b| {
        (b.downstream.preference(), b.weight).cmp(&(a.downstream.preference(), a.weight))
    });

    for pair in candidates {
        if last {
            return true;
        }
        // The next element must accept this mechanism on its upstream
        // side; its own pairing choice is made one level down.
        chosen.push(pair.downstream);
        if search(elements, idx + 1, pair.downstream, chosen) {
            return true;
        }
        chosen.pop();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{NullSink, PatternSource, Queue, XorFilter};

    fn elts(v: Vec<Arc<dyn Element>>) -> Vec<Arc<dyn Element>> {
        v
    }

    #[test]
    fn test_source_to_sink_prefers_pull() {
        // Pattern offers only None->PullBuffer; the sink accepts it.
        let chain = elts(vec![
            Arc::new(PatternSource::new(b"A", Some(1)).unwrap()),
            Arc::new(NullSink::new()),
        ]);
        let mechs = negotiate(&chain).unwrap();
        assert_eq!(mechs, vec![Mechanism::PullBuffer]);
    }

    #[test]
    fn test_filter_chain_negotiates_every_edge() {
        let chain = elts(vec![
            Arc::new(PatternSource::new(b"A", Some(1)).unwrap()),
            Arc::new(XorFilter::new(0x55)),
            Arc::new(NullSink::new()),
        ]);
        let mechs = negotiate(&chain).unwrap();
        // Push-buffer outranks pull-buffer, so the filter pulls from
        // the source and pushes into the sink.
        assert_eq!(mechs, vec![Mechanism::PullBuffer, Mechanism::PushBuffer]);
    }

    #[test]
    fn test_queue_forces_push_then_pull() {
        let chain = elts(vec![
            Arc::new(PatternSource::new(b"A", Some(1)).unwrap()),
            Arc::new(XorFilter::new(0x55)),
            Arc::new(Queue::new(4).unwrap()),
            Arc::new(NullSink::new()),
        ]);
        let mechs = negotiate(&chain).unwrap();
        // The queue only takes push in and serves pull out, so the
        // filter's pull-in/push-out pairing is the one that fits.
        assert_eq!(
            mechs,
            vec![
                Mechanism::PullBuffer,
                Mechanism::PushBuffer,
                Mechanism::PullBuffer,
            ]
        );
    }

    #[test]
    fn test_incompatible_chain_is_a_config_error() {
        // Two sources back to back share no edge mechanism.
        let chain = elts(vec![
            Arc::new(PatternSource::new(b"A", Some(1)).unwrap()),
            Arc::new(PatternSource::new(b"B", Some(1)).unwrap()),
        ]);
        let err = negotiate(&chain).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_single_element_is_rejected() {
        let chain = elts(vec![Arc::new(NullSink::new())]);
        assert!(matches!(negotiate(&chain), Err(Error::Config(_))));
    }

    #[test]
    fn test_sink_cannot_lead_the_chain() {
        let chain = elts(vec![
            Arc::new(NullSink::new()),
            Arc::new(NullSink::new()),
        ]);
        assert!(matches!(negotiate(&chain), Err(Error::Config(_))));
    }
}
