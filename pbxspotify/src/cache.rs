//! Cache de l'état de lecture et fenêtre de cooldown
//!
//! Deux instantanés sont conservés :
//!
//! - `last_good` : dernier instantané obtenu avec succès, source du mode
//!   « stale-while-error » ;
//! - `last_served` : dernier instantané rendu après un appel réel (succès ou
//!   erreur), servi tant qu'il est frais pour ne pas marteler l'API.

use crate::models::{PlaybackSnapshot, PlaybackState};
use std::time::{Duration, Instant};

/// Durée de vie minimale du cache
pub const MIN_CACHE_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct PlaybackCache {
    last_good: Option<PlaybackSnapshot>,
    last_served: Option<PlaybackSnapshot>,
    checked_at: Option<Instant>,
    succeeded_at: Option<Instant>,
    cooldown_until: Option<Instant>,
    cooldown_reason: String,
}

impl PlaybackCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dernier instantané servi, s'il date de moins de `ttl`
    pub fn fresh(&self, ttl: Duration) -> Option<PlaybackSnapshot> {
        let ttl = ttl.max(MIN_CACHE_TTL);
        match (self.checked_at, &self.last_served) {
            (Some(at), Some(snapshot)) if at.elapsed() < ttl => Some(snapshot.clone()),
            _ => None,
        }
    }

    /// Dernier instantané servi, quel que soit son âge
    pub fn last_served(&self) -> Option<PlaybackSnapshot> {
        self.last_served.clone()
    }

    pub fn last_good(&self) -> Option<PlaybackSnapshot> {
        self.last_good.clone()
    }

    /// Secondes écoulées depuis le dernier succès
    pub fn last_fetch_age(&self) -> Option<u64> {
        self.succeeded_at.map(|at| at.elapsed().as_secs())
    }

    /// Remplace le cache par un instantané obtenu avec succès
    pub fn store_success(&mut self, snapshot: &PlaybackSnapshot) {
        let now = Instant::now();
        self.last_good = Some(snapshot.clone());
        self.last_served = Some(snapshot.clone());
        self.checked_at = Some(now);
        self.succeeded_at = Some(now);
    }

    /// Enregistre un échec et retourne l'instantané à servir
    ///
    /// Avec un précédent succès, c'est ce dernier qui est servi, avec l'état
    /// remplacé (`cooldown` si un cooldown est actif, sinon l'état d'échec)
    /// et l'erreur renseignée. Le booléen indique si l'instantané vient du
    /// cache.
    pub fn store_failure(&mut self, failure: PlaybackSnapshot) -> (PlaybackSnapshot, bool) {
        self.checked_at = Some(Instant::now());

        let Some(mut stale) = self.last_good.clone() else {
            self.last_served = Some(failure.clone());
            return (failure, false);
        };

        stale.state = if self.cooldown_remaining() > 0 {
            PlaybackState::Cooldown
        } else {
            failure.state
        };
        if failure.error.is_some() {
            stale.error = failure.error;
        }
        self.last_served = Some(stale.clone());
        (stale, true)
    }

    /// Force le prochain appel à interroger l'API
    pub fn mark_stale(&mut self) {
        self.checked_at = None;
    }

    pub fn enter_cooldown(&mut self, duration: Duration, reason: impl Into<String>) {
        self.cooldown_until = Some(Instant::now() + duration);
        self.cooldown_reason = reason.into();
    }

    /// Secondes restantes de cooldown (0 si aucun)
    pub fn cooldown_remaining(&self) -> u64 {
        self.cooldown_until
            .map(|until| until.saturating_duration_since(Instant::now()).as_secs())
            .unwrap_or(0)
    }

    pub fn cooldown_reason(&self) -> &str {
        &self.cooldown_reason
    }

    /// Échéance du cooldown en temps Unix, pour les journaux
    pub fn cooldown_deadline(&self) -> Option<i64> {
        self.cooldown_until.map(|until| {
            let remaining = until.saturating_duration_since(Instant::now());
            chrono::Utc::now().timestamp() + remaining.as_secs() as i64
        })
    }
}
