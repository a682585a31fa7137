//! Canonical presence state: the watch list with its session accounting and the
//! roster of every player currently visible, fed by normalized observations.

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    dao::models::{SessionEntity, WatchedIdentityEntity},
    state::identity::{Identity, Namespace},
};

/// A single normalized online/offline signal for one identity from one producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub identity: Identity,
    pub online: bool,
    pub display_name: Option<String>,
}

impl Observation {
    /// Online signal carrying the name the producer reported.
    pub fn online(identity: Identity, display_name: impl Into<String>) -> Self {
        Self {
            identity,
            online: true,
            display_name: Some(display_name.into()),
        }
    }

    /// Offline signal without a name update.
    pub fn offline(identity: Identity) -> Self {
        Self {
            identity,
            online: false,
            display_name: None,
        }
    }
}

/// Closed interval of continuous online time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
}

/// A tracked player and its online-time accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedIdentity {
    pub identity: Identity,
    pub display_name: String,
    /// Set exactly while the identity is online.
    session_started_at: Option<u64>,
    cumulative_online_ms: u64,
    sessions: Vec<Session>,
    pub added_at: u64,
}

impl WatchedIdentity {
    fn new(identity: Identity, display_name: String, added_at: u64) -> Self {
        Self {
            identity,
            display_name,
            session_started_at: None,
            cumulative_online_ms: 0,
            sessions: Vec::new(),
            added_at,
        }
    }

    pub fn is_online(&self) -> bool {
        self.session_started_at.is_some()
    }

    pub fn session_started_at(&self) -> Option<u64> {
        self.session_started_at
    }

    pub fn cumulative_online_ms(&self) -> u64 {
        self.cumulative_online_ms
    }

    /// Closed sessions, oldest first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Length of the open session at `now`, zero when offline.
    pub fn live_session_ms(&self, now: u64) -> u64 {
        self.session_started_at
            .map(|start| now.saturating_sub(start))
            .unwrap_or(0)
    }

    fn open_session(&mut self, now: u64) {
        self.session_started_at = Some(now);
    }

    fn close_session(&mut self, now: u64) -> Option<Session> {
        let start_ms = self.session_started_at.take()?;
        let session = Session {
            start_ms,
            end_ms: now,
            duration_ms: now.saturating_sub(start_ms),
        };
        self.sessions.push(session);
        self.cumulative_online_ms += session.duration_ms;
        Some(session)
    }
}

/// Player currently visible on the server, watched or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub identity: Identity,
    pub display_name: String,
    pub last_seen_at: u64,
}

/// Direction of a presence transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    Online,
    Offline,
}

/// Externally visible result of a state-changing observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub identity: Identity,
    pub display_name: String,
    pub transition: PresenceTransition,
    pub at_ms: u64,
    /// The session closed by an offline transition.
    pub closed_session: Option<Session>,
}

/// Watch-list maintenance failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresenceError {
    #[error("`{0}` is already on the watch list")]
    AlreadyWatched(String),
    #[error("`{0}` is not on the watch list")]
    NotWatched(String),
}

/// Owner of the watch list and roster tables.
#[derive(Debug, Default)]
pub struct PresenceBook {
    watched: IndexMap<Identity, WatchedIdentity>,
    roster: IndexMap<Identity, RosterEntry>,
}

impl PresenceBook {
    /// Restore the watch list from persisted records.
    ///
    /// Records with an open session stay online with their original start time: nothing
    /// observed the identity going offline, so no duration is fabricated here. The next
    /// observation for the identity is processed by the normal rules.
    pub fn from_entities(entities: Vec<WatchedIdentityEntity>) -> Self {
        let mut watched = IndexMap::with_capacity(entities.len());
        for entity in entities {
            let record: WatchedIdentity = entity.into();
            if record.is_online() {
                info!(identity = %record.identity, "restored watched identity with an open session");
            }
            watched.insert(record.identity.clone(), record);
        }
        Self {
            watched,
            roster: IndexMap::new(),
        }
    }

    /// Snapshot the watch list in its persisted shape.
    pub fn to_entities(&self) -> Vec<WatchedIdentityEntity> {
        self.watched.values().cloned().map(Into::into).collect()
    }

    /// Watched identities in insertion order.
    pub fn watched(&self) -> impl Iterator<Item = &WatchedIdentity> {
        self.watched.values()
    }

    /// Look up one watched identity.
    pub fn get(&self, identity: &Identity) -> Option<&WatchedIdentity> {
        self.watched.get(identity)
    }

    /// Every player currently visible, in order of first sighting.
    pub fn roster(&self) -> impl Iterator<Item = &RosterEntry> {
        self.roster.values()
    }

    /// Add an identity to the watch list.
    ///
    /// An identity currently present in the roster starts online, since the roster entry is
    /// itself the latest observation for it.
    pub fn watch(
        &mut self,
        identity: Identity,
        display_name: Option<String>,
        now: u64,
    ) -> Result<(WatchedIdentity, Option<PresenceChange>), PresenceError> {
        if self.watched.contains_key(&identity) {
            return Err(PresenceError::AlreadyWatched(identity.key()));
        }

        let roster_entry = self.roster.get(&identity);
        let display_name = display_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| roster_entry.map(|entry| entry.display_name.clone()))
            .unwrap_or_else(|| identity.key());

        let mut record = WatchedIdentity::new(identity.clone(), display_name, now);
        let change = roster_entry.map(|_| {
            record.open_session(now);
            PresenceChange {
                identity: identity.clone(),
                display_name: record.display_name.clone(),
                transition: PresenceTransition::Online,
                at_ms: now,
                closed_session: None,
            }
        });

        self.watched.insert(identity, record.clone());
        Ok((record, change))
    }

    /// Remove an identity from the watch list, returning its final record.
    pub fn unwatch(&mut self, identity: &Identity) -> Result<WatchedIdentity, PresenceError> {
        self.watched
            .shift_remove(identity)
            .ok_or_else(|| PresenceError::NotWatched(identity.key()))
    }

    /// Apply one observation, returning the transition it caused, if any.
    ///
    /// Repeated signals (online→online, offline→offline) only refresh the display name.
    pub fn observe(&mut self, observation: Observation, now: u64) -> Option<PresenceChange> {
        let Observation {
            identity,
            online,
            display_name,
        } = observation;
        let display_name = display_name.filter(|name| !name.trim().is_empty());

        self.update_roster(&identity, online, display_name.as_deref(), now);

        let record = self.watched.get_mut(&identity)?;
        if let Some(name) = display_name {
            record.display_name = name;
        }

        let (transition, closed_session) = match (record.is_online(), online) {
            (false, true) => {
                record.open_session(now);
                (PresenceTransition::Online, None)
            }
            (true, false) => (PresenceTransition::Offline, record.close_session(now)),
            _ => return None,
        };

        debug!(identity = %identity, ?transition, "presence transition");
        Some(PresenceChange {
            display_name: record.display_name.clone(),
            identity,
            transition,
            at_ms: now,
            closed_session,
        })
    }

    /// Apply a batch of observations produced by the `source` namespace.
    ///
    /// Observations naming an identity from another namespace are dropped.
    pub fn apply_observations(
        &mut self,
        source: Namespace,
        observations: Vec<Observation>,
        now: u64,
    ) -> Vec<PresenceChange> {
        observations
            .into_iter()
            .filter(|observation| {
                let same_source = observation.identity.namespace() == source;
                if !same_source {
                    warn!(
                        identity = %observation.identity,
                        ?source,
                        "dropping observation for an identity outside the producer namespace"
                    );
                }
                same_source
            })
            .filter_map(|observation| self.observe(observation, now))
            .collect()
    }

    /// Replace the secondary-namespace listing with `listed`.
    ///
    /// Every listed identity is observed online; every secondary identity currently known to
    /// be online but absent from the listing is observed offline once.
    pub fn apply_listing(&mut self, listed: Vec<Observation>, now: u64) -> Vec<PresenceChange> {
        let listed: Vec<Observation> = listed
            .into_iter()
            .filter(|observation| observation.identity.namespace() == Namespace::Secondary)
            .map(|observation| Observation {
                online: true,
                ..observation
            })
            .collect();
        let present: HashSet<Identity> = listed
            .iter()
            .map(|observation| observation.identity.clone())
            .collect();

        let vanished: Vec<Identity> = self
            .roster
            .keys()
            .chain(
                self.watched
                    .values()
                    .filter(|record| record.is_online())
                    .map(|record| &record.identity),
            )
            .filter(|identity| identity.namespace() == Namespace::Secondary)
            .filter(|identity| !present.contains(*identity))
            .cloned()
            .collect::<indexmap::IndexSet<_>>()
            .into_iter()
            .collect();

        let mut changes = self.apply_observations(Namespace::Secondary, listed, now);
        changes.extend(
            vanished
                .into_iter()
                .filter_map(|identity| self.observe(Observation::offline(identity), now)),
        );
        changes
    }

    fn update_roster(
        &mut self,
        identity: &Identity,
        online: bool,
        display_name: Option<&str>,
        now: u64,
    ) {
        if !online {
            self.roster.shift_remove(identity);
            return;
        }

        match self.roster.get_mut(identity) {
            Some(entry) => {
                if let Some(name) = display_name {
                    entry.display_name = name.to_string();
                }
                entry.last_seen_at = now;
            }
            None => {
                let display_name = display_name
                    .map(str::to_string)
                    .unwrap_or_else(|| identity.key());
                self.roster.insert(
                    identity.clone(),
                    RosterEntry {
                        identity: identity.clone(),
                        display_name,
                        last_seen_at: now,
                    },
                );
            }
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(value: SessionEntity) -> Self {
        Self {
            start_ms: value.start_ms,
            end_ms: value.end_ms,
            duration_ms: value.duration_ms,
        }
    }
}

impl From<Session> for SessionEntity {
    fn from(value: Session) -> Self {
        Self {
            start_ms: value.start_ms,
            end_ms: value.end_ms,
            duration_ms: value.duration_ms,
        }
    }
}

impl From<WatchedIdentityEntity> for WatchedIdentity {
    fn from(value: WatchedIdentityEntity) -> Self {
        Self {
            identity: Identity::from_parts(value.namespace, value.raw_id),
            display_name: value.display_name,
            session_started_at: value.session_started_at_ms,
            cumulative_online_ms: value.cumulative_online_ms,
            sessions: value.sessions.into_iter().map(Into::into).collect(),
            added_at: value.added_at_ms,
        }
    }
}

impl From<WatchedIdentity> for WatchedIdentityEntity {
    fn from(value: WatchedIdentity) -> Self {
        Self {
            namespace: value.identity.namespace(),
            raw_id: value.identity.raw_id().to_string(),
            display_name: value.display_name,
            session_started_at_ms: value.session_started_at,
            cumulative_online_ms: value.cumulative_online_ms,
            sessions: value.sessions.into_iter().map(Into::into).collect(),
            added_at_ms: value.added_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    const STEAM_ID: &str = "76561198000000001";

    fn book_watching(identity: &Identity, now: u64) -> PresenceBook {
        let mut book = PresenceBook::default();
        book.watch(identity.clone(), Some("rusty".into()), now).unwrap();
        book
    }

    #[test]
    fn one_closed_session_after_online_then_offline() {
        let identity = Identity::primary(STEAM_ID);
        let t0 = 1_700_000_000_000;
        let t1 = t0 + 5_000;
        let t2 = t1 + 600_000;
        let mut book = book_watching(&identity, t0);

        let online = book
            .observe(Observation::online(identity.clone(), "rusty"), t1)
            .unwrap();
        assert_eq!(online.transition, PresenceTransition::Online);

        let offline = book.observe(Observation::offline(identity.clone()), t2).unwrap();
        assert_eq!(offline.transition, PresenceTransition::Offline);

        let record = book.get(&identity).unwrap();
        assert_eq!(
            record.sessions(),
            &[Session {
                start_ms: t1,
                end_ms: t2,
                duration_ms: 600_000
            }]
        );
        assert_eq!(record.cumulative_online_ms(), 600_000);
        assert!(!record.is_online());
        assert_eq!(record.session_started_at(), None);
    }

    #[test]
    fn repeated_signals_only_refresh_the_name() {
        let identity = Identity::primary(STEAM_ID);
        let mut book = book_watching(&identity, 0);

        assert!(book.observe(Observation::offline(identity.clone()), 10).is_none());
        assert!(book.observe(Observation::online(identity.clone(), "a"), 20).is_some());
        assert!(book.observe(Observation::online(identity.clone(), "b"), 30).is_none());

        let record = book.get(&identity).unwrap();
        assert_eq!(record.display_name, "b");
        assert_eq!(record.session_started_at(), Some(20));
        assert!(record.sessions().is_empty());
        assert_eq!(record.cumulative_online_ms(), 0);
    }

    #[test]
    fn online_flag_and_session_start_stay_in_lockstep() {
        let identity = Identity::primary(STEAM_ID);
        let mut book = book_watching(&identity, 0);
        let mut rng = StdRng::seed_from_u64(7);
        let mut now = 0;
        let mut expected_total = 0;
        let mut open_since = None;

        for _ in 0..500 {
            now += rng.random_range(1..10_000);
            let online = rng.random_bool(0.5);
            let observation = if online {
                Observation::online(identity.clone(), "rusty")
            } else {
                Observation::offline(identity.clone())
            };
            book.observe(observation, now);

            match (open_since, online) {
                (None, true) => open_since = Some(now),
                (Some(start), false) => {
                    expected_total += now - start;
                    open_since = None;
                }
                _ => {}
            }

            let record = book.get(&identity).unwrap();
            assert_eq!(record.is_online(), record.session_started_at().is_some());
            assert_eq!(record.session_started_at(), open_since);
        }

        let record = book.get(&identity).unwrap();
        let summed: u64 = record
            .sessions()
            .iter()
            .map(|session| session.end_ms - session.start_ms)
            .sum();
        assert_eq!(record.cumulative_online_ms(), summed);
        assert_eq!(record.cumulative_online_ms(), expected_total);
    }

    #[test]
    fn unwatched_identities_only_touch_the_roster() {
        let mut book = PresenceBook::default();
        let stranger = Identity::primary("1");

        assert!(book.observe(Observation::online(stranger.clone(), "x"), 5).is_none());
        assert_eq!(book.roster().count(), 1);
        assert_eq!(book.watched().count(), 0);

        assert!(book.observe(Observation::offline(stranger), 6).is_none());
        assert_eq!(book.roster().count(), 0);
    }

    #[test]
    fn producers_never_update_the_other_namespace() {
        let primary = Identity::primary("42");
        let mut book = book_watching(&primary, 0);

        let changes = book.apply_observations(
            Namespace::Primary,
            vec![Observation::online(Identity::secondary("42"), "impostor")],
            10,
        );
        assert!(changes.is_empty());
        assert!(!book.get(&primary).unwrap().is_online());
        assert_eq!(book.roster().count(), 0);
    }

    #[test]
    fn vanished_listing_entry_goes_offline_exactly_once() {
        let secondary = Identity::secondary("42");
        let mut book = book_watching(&secondary, 0);

        let changes = book.apply_listing(vec![Observation::online(secondary.clone(), "bm")], 100);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].transition, PresenceTransition::Online);

        let changes = book.apply_listing(Vec::new(), 400);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].transition, PresenceTransition::Offline);
        assert_eq!(changes[0].closed_session.unwrap().duration_ms, 300);

        let other = Identity::secondary("7");
        let changes = book.apply_listing(vec![Observation::online(other, "other")], 700);
        assert!(changes.is_empty());
        assert_eq!(book.get(&secondary).unwrap().sessions().len(), 1);
    }

    #[test]
    fn listing_replaces_the_secondary_roster_only() {
        let mut book = PresenceBook::default();
        book.observe(Observation::online(Identity::primary("9"), "feed"), 1);
        book.apply_listing(
            vec![
                Observation::online(Identity::secondary("1"), "a"),
                Observation::online(Identity::secondary("2"), "b"),
            ],
            2,
        );
        book.apply_listing(vec![Observation::online(Identity::secondary("2"), "b")], 3);

        let keys: Vec<String> = book.roster().map(|entry| entry.identity.key()).collect();
        assert_eq!(keys, vec!["9".to_string(), "bm_2".to_string()]);
    }

    #[test]
    fn restart_keeps_open_sessions_open() {
        let identity = Identity::primary(STEAM_ID);
        let mut book = book_watching(&identity, 0);
        book.observe(Observation::online(identity.clone(), "rusty"), 1_000);
        book.observe(Observation::offline(identity.clone()), 2_000);
        book.observe(Observation::online(identity.clone(), "rusty"), 3_000);

        let mut restored = PresenceBook::from_entities(book.to_entities());
        let record = restored.get(&identity).unwrap();
        assert!(record.is_online());
        assert_eq!(record.session_started_at(), Some(3_000));
        assert_eq!(record.cumulative_online_ms(), 1_000);

        assert!(
            restored
                .observe(Observation::online(identity.clone(), "rusty"), 9_000)
                .is_none()
        );
        let change = restored
            .observe(Observation::offline(identity.clone()), 10_000)
            .unwrap();
        assert_eq!(change.closed_session.unwrap().duration_ms, 7_000);
        assert_eq!(restored.get(&identity).unwrap().cumulative_online_ms(), 8_000);
    }

    #[test]
    fn watching_a_visible_player_starts_online() {
        let identity = Identity::primary(STEAM_ID);
        let mut book = PresenceBook::default();
        book.observe(Observation::online(identity.clone(), "rusty"), 50);

        let (record, change) = book.watch(identity.clone(), None, 80).unwrap();
        assert_eq!(record.display_name, "rusty");
        assert!(record.is_online());
        assert_eq!(change.unwrap().transition, PresenceTransition::Online);

        assert_eq!(
            book.watch(identity.clone(), None, 90).unwrap_err(),
            PresenceError::AlreadyWatched(STEAM_ID.into())
        );
        book.unwatch(&identity).unwrap();
        assert_eq!(
            book.unwatch(&identity).unwrap_err(),
            PresenceError::NotWatched(STEAM_ID.into())
        );
    }
}
