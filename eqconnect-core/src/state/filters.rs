//! Ordered collection of equalizer bands plus preamp and bypass state.
//!
//! Structural edits are recorded in a change log and published as
//! coalesced events. A bulk update from the server flushes once at the
//! end, in the order removed, added, changed.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::EqError;
use crate::events::EventBus;
use crate::state::filter::{
    BandParameters, Filter, GAIN_ACCURACY, MAX_PREAMP_GAIN, parse_decibels,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    Added(Vec<usize>),
    Removed(Vec<usize>),
    Changed(Vec<usize>),
    PreampChanged(f64),
    EqualizerApplied(bool),
}

#[derive(Debug, Default)]
struct ChangeLog {
    added: BTreeSet<usize>,
    removed: BTreeSet<usize>,
    changed: BTreeSet<usize>,
}

#[derive(Debug, Default)]
pub struct FilterStore {
    filters: Vec<Filter>,
    preamp_gain: f64,
    equalizer_applied: bool,
    log: ChangeLog,
    batching: bool,
    events: EventBus<FilterEvent>,
}

impl FilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FilterEvent> {
        self.events.subscribe()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn filter(&self, index: usize) -> Option<&Filter> {
        self.filters.get(index)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn gains(&self) -> Vec<f64> {
        self.filters.iter().map(Filter::gain).collect()
    }

    /// Index of the band equal to `filter`.
    ///
    /// Band frequencies are distinct, so equality identifies a single band.
    pub fn filter_index(&self, filter: &Filter) -> Option<usize> {
        self.filters.iter().position(|f| f == filter)
    }

    // ── Preamp / bypass ──────────────────────────────────────────

    pub fn preamp_gain(&self) -> f64 {
        self.preamp_gain
    }

    /// Clamps to ±[`MAX_PREAMP_GAIN`] and always notifies.
    pub fn set_preamp_gain(&mut self, db: f64) {
        if db.is_nan() {
            return;
        }
        self.preamp_gain = db.clamp(-MAX_PREAMP_GAIN, MAX_PREAMP_GAIN);
        self.events
            .publish(FilterEvent::PreampChanged(self.preamp_gain));
    }

    pub fn is_equalizer_applied(&self) -> bool {
        self.equalizer_applied
    }

    /// Always notifies.
    pub fn set_equalizer_applied(&mut self, applied: bool) {
        self.equalizer_applied = applied;
        self.events.publish(FilterEvent::EqualizerApplied(applied));
    }

    // ── Structural edits ─────────────────────────────────────────

    /// Appends a band and respaces the others. Returns its index.
    pub fn add_filter(&mut self, gain: f64) -> usize {
        let index = self.filters.len();
        let params = BandParameters::generate(index + 1, index);
        self.filters.push(Filter::from_parameters(params, gain));
        self.log.added.insert(index);
        self.regenerate();
        self.flush();
        index
    }

    /// Removes the last band and respaces the rest.
    pub fn remove_filter(&mut self) -> Option<Filter> {
        let removed = self.filters.pop()?;
        let index = self.filters.len();
        self.log.changed.remove(&index);
        if !self.log.added.remove(&index) {
            self.log.removed.insert(index);
        }
        self.regenerate();
        self.flush();
        Some(removed)
    }

    /// Removes every band in one notification.
    pub fn clear(&mut self) {
        if self.filters.is_empty() {
            return;
        }
        for index in 0..self.filters.len() {
            self.log.changed.remove(&index);
            if !self.log.added.remove(&index) {
                self.log.removed.insert(index);
            }
        }
        self.filters.clear();
        self.flush();
    }

    /// Reconciles the store with a gain list received from the server.
    ///
    /// Entries that fail to parse are logged and skipped: an existing band
    /// keeps its gain, a new band starts flat. Locks are bypassed.
    pub fn set_gains<S: AsRef<str>>(&mut self, values: &[S]) {
        let gains: Vec<Option<f64>> = values
            .iter()
            .enumerate()
            .map(|(index, raw)| match parse_decibels("gain", raw.as_ref()) {
                Ok(gain) => Some(gain),
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed gain");
                    None
                }
            })
            .collect();
        self.reconcile(&gains);
    }

    /// Like [`set_gains`](Self::set_gains) for values already parsed.
    pub fn set_gain_values(&mut self, values: &[f64]) {
        let gains: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
        self.reconcile(&gains);
    }

    /// A user edit of one band. Rejected while the band is locked.
    ///
    /// Returns whether the gain moved by at least [`GAIN_ACCURACY`].
    pub fn set_filter_gain(&mut self, index: usize, db: f64) -> Result<bool, EqError> {
        let filter = self
            .filters
            .get_mut(index)
            .ok_or(EqError::NoSuchFilter(index))?;
        if filter.is_locked() {
            debug!(index, "gain edit rejected, band is locked");
            return Ok(false);
        }
        let changed = filter.set_gain(db);
        if changed {
            self.log.changed.insert(index);
            self.flush();
        }
        Ok(changed)
    }

    pub fn set_filter_locked(&mut self, index: usize, locked: bool) -> Result<(), EqError> {
        self.filters
            .get_mut(index)
            .ok_or(EqError::NoSuchFilter(index))?
            .set_locked(locked);
        Ok(())
    }

    fn reconcile(&mut self, gains: &[Option<f64>]) {
        self.batching = true;

        while self.filters.len() > gains.len() {
            self.remove_filter();
        }

        for (index, gain) in gains.iter().enumerate() {
            if index >= self.filters.len() {
                self.add_filter(gain.unwrap_or(0.0));
                continue;
            }
            let Some(gain) = *gain else { continue };
            let filter = &mut self.filters[index];
            if (filter.gain() - gain).abs() < GAIN_ACCURACY {
                continue;
            }
            if filter.unlocked(|f| f.set_gain(gain)) && !self.log.added.contains(&index) {
                self.log.changed.insert(index);
            }
        }

        self.batching = false;
        self.flush();
    }

    /// Respaces every band for the current count.
    fn regenerate(&mut self) {
        let count = self.filters.len();
        for (index, filter) in self.filters.iter_mut().enumerate() {
            let changed = filter.apply_parameters(BandParameters::generate(count, index));
            if changed && !self.log.added.contains(&index) {
                self.log.changed.insert(index);
            }
        }
    }

    fn flush(&mut self) {
        if self.batching {
            return;
        }
        let ChangeLog {
            added,
            removed,
            changed,
        } = std::mem::take(&mut self.log);

        if !removed.is_empty() {
            self.events
                .publish(FilterEvent::Removed(removed.into_iter().collect()));
        }
        if !added.is_empty() {
            self.events
                .publish(FilterEvent::Added(added.into_iter().collect()));
        }
        if !changed.is_empty() {
            self.events
                .publish(FilterEvent::Changed(changed.into_iter().collect()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::filter::GAIN_MAX;

    fn drain(rx: &mut mpsc::UnboundedReceiver<FilterEvent>) -> Vec<FilterEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn bulk_update_from_empty_is_one_added_event() {
        let mut store = FilterStore::new();
        let mut rx = store.subscribe();

        store.set_gains(&["1", "2", "3"]);

        assert_eq!(drain(&mut rx), vec![FilterEvent::Added(vec![0, 1, 2])]);
        assert_eq!(store.gains(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn shrink_and_change_flushes_removed_then_changed() {
        let mut store = FilterStore::new();
        store.set_gains(&["1", "2", "3"]);
        let mut rx = store.subscribe();

        store.set_gains(&["1", "5"]);

        assert_eq!(
            drain(&mut rx),
            vec![
                FilterEvent::Removed(vec![2]),
                FilterEvent::Changed(vec![0, 1]),
            ]
        );
        assert_eq!(store.gains(), vec![1.0, 5.0]);
    }

    #[test]
    fn unchanged_bulk_update_is_silent() {
        let mut store = FilterStore::new();
        store.set_gains(&["1", "2"]);
        let mut rx = store.subscribe();

        store.set_gains(&["1.05", "2"]);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn empty_list_removes_everything() {
        let mut store = FilterStore::new();
        store.set_gain_values(&[0.0, 0.0, 0.0]);
        let mut rx = store.subscribe();

        store.set_gain_values(&[]);
        assert_eq!(drain(&mut rx), vec![FilterEvent::Removed(vec![0, 1, 2])]);
        assert!(store.is_empty());
    }

    #[test]
    fn malformed_entry_keeps_existing_gain() {
        let mut store = FilterStore::new();
        store.set_gains(&["1", "2"]);

        store.set_gains(&["abc", "4", "x"]);
        assert_eq!(store.gains(), vec![1.0, 4.0, 0.0]);
    }

    #[test]
    fn server_update_bypasses_lock_and_restores_it() {
        let mut store = FilterStore::new();
        store.set_gains(&["1", "2"]);
        store.set_filter_locked(0, true).unwrap();

        store.set_gains(&["6", "2"]);
        assert_eq!(store.gains(), vec![6.0, 2.0]);
        assert!(store.filter(0).unwrap().is_locked());
    }

    #[test]
    fn user_edit_respects_lock() {
        let mut store = FilterStore::new();
        store.set_gains(&["1"]);
        store.set_filter_locked(0, true).unwrap();

        assert!(!store.set_filter_gain(0, 9.0).unwrap());
        assert_eq!(store.gains(), vec![1.0]);
        assert!(matches!(
            store.set_filter_gain(3, 1.0),
            Err(EqError::NoSuchFilter(3))
        ));
    }

    #[test]
    fn user_edit_clamps_and_notifies() {
        let mut store = FilterStore::new();
        store.set_gains(&["0"]);
        let mut rx = store.subscribe();

        assert!(store.set_filter_gain(0, 99.0).unwrap());
        assert_eq!(store.gains(), vec![GAIN_MAX]);
        assert_eq!(drain(&mut rx), vec![FilterEvent::Changed(vec![0])]);
    }

    #[test]
    fn add_and_remove_respace_bands() {
        let mut store = FilterStore::new();
        store.add_filter(0.0);
        store.add_filter(0.0);
        let mut rx = store.subscribe();

        assert_eq!(store.add_filter(0.0), 2);
        let events = drain(&mut rx);
        assert_eq!(events[0], FilterEvent::Added(vec![2]));
        assert_eq!(events[1], FilterEvent::Changed(vec![0, 1]));

        for pair in store.filters().windows(2) {
            assert!(pair[0].frequency() < pair[1].frequency());
            assert_eq!(pair[0].q(), pair[1].q());
        }

        assert!(store.remove_filter().is_some());
        assert_eq!(drain(&mut rx)[0], FilterEvent::Removed(vec![2]));
    }

    #[test]
    fn remove_from_empty_is_none() {
        let mut store = FilterStore::new();
        assert!(store.remove_filter().is_none());
    }

    #[test]
    fn clear_emits_single_removed_event() {
        let mut store = FilterStore::new();
        store.set_gain_values(&[1.0, 2.0]);
        let mut rx = store.subscribe();

        store.clear();
        store.clear();
        assert_eq!(drain(&mut rx), vec![FilterEvent::Removed(vec![0, 1])]);
    }

    #[test]
    fn preamp_and_bypass_always_notify() {
        let mut store = FilterStore::new();
        let mut rx = store.subscribe();

        store.set_preamp_gain(50.0);
        store.set_preamp_gain(50.0);
        store.set_equalizer_applied(false);

        assert_eq!(
            drain(&mut rx),
            vec![
                FilterEvent::PreampChanged(MAX_PREAMP_GAIN),
                FilterEvent::PreampChanged(MAX_PREAMP_GAIN),
                FilterEvent::EqualizerApplied(false),
            ]
        );
    }

    #[test]
    fn filter_index_finds_band() {
        let mut store = FilterStore::new();
        store.set_gain_values(&[1.0, 2.0]);
        let second = store.filter(1).unwrap().clone();
        assert_eq!(store.filter_index(&second), Some(1));
        assert_eq!(store.filter_index(&Filter::new(30.0, 0.0, 1.0)), None);
    }
}
