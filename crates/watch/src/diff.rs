use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{EventKind, WatchEvent, WatchOptions, Watchable};

/// Last observed state per identity, ordered by identity.
pub(crate) type Snapshot<R> = BTreeMap<<R as Watchable>::Id, <R as Watchable>::State>;

pub(crate) fn snapshot_of<R: Watchable>(items: &[R]) -> Snapshot<R> {
    items.iter().map(|r| (r.id(), r.state())).collect()
}

/// Baseline contents reported as `New`, for watches that ask for it.
pub(crate) fn baseline<R: Watchable>(items: &[R], opts: &WatchOptions, at: DateTime<Utc>) -> Vec<WatchEvent<R>> {
    if opts.exclude_new {
        return Vec::new();
    }
    let by_id: BTreeMap<R::Id, &R> = items.iter().map(|r| (r.id(), r)).collect();
    by_id.into_values().map(|r| new_event(r, at)).collect()
}

fn new_event<R: Watchable>(r: &R, at: DateTime<Utc>) -> WatchEvent<R> {
    WatchEvent {
        kind: EventKind::New,
        resource_kind: R::KIND,
        id: Some(r.id()),
        old_state: None,
        new_state: Some(r.state()),
        resource: Some(r.clone()),
        at,
        error: None,
    }
}

/// Events for one poll: new, then state changes, then disappearances, each
/// group in identity order.
pub(crate) fn diff<R: Watchable>(
    prev: &Snapshot<R>,
    items: &[R],
    opts: &WatchOptions,
    at: DateTime<Utc>,
) -> Vec<WatchEvent<R>> {
    let current: BTreeMap<R::Id, &R> = items.iter().map(|r| (r.id(), r)).collect();
    let mut created = Vec::new();
    let mut changed = Vec::new();
    for (id, r) in &current {
        match prev.get(id) {
            None => {
                if !opts.exclude_new {
                    created.push(new_event(*r, at));
                }
            }
            Some(old) => {
                let now = r.state();
                if *old != now {
                    changed.push(WatchEvent {
                        kind: EventKind::StateChanged,
                        resource_kind: R::KIND,
                        id: Some(id.clone()),
                        old_state: Some(old.clone()),
                        new_state: Some(now),
                        resource: Some((*r).clone()),
                        at,
                        error: None,
                    });
                }
            }
        }
    }
    let mut gone = Vec::new();
    if !opts.exclude_removed {
        for (id, old) in prev {
            if !current.contains_key(id) {
                gone.push(WatchEvent {
                    kind: R::vanished(),
                    resource_kind: R::KIND,
                    id: Some(id.clone()),
                    old_state: Some(old.clone()),
                    new_state: None,
                    resource: None,
                    at,
                    error: None,
                });
            }
        }
    }
    created.extend(changed);
    created.extend(gone);
    created
}
