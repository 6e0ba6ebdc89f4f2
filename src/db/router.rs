//! Primary/replica routing.
//!
//! Writes always go to the primary. Reads pick one replica uniformly at
//! random for every statement and fall back to the primary when no replica
//! is configured. There is no session affinity, so two reads issued back to
//! back may land on different replicas.

use std::fmt;

use rand::Rng;

/// What a statement does to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// `SELECT` and friends.
    Read,
    /// `INSERT`, `UPDATE`, `DELETE`.
    Write,
}

/// Target chosen for one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// The writable primary.
    Primary,
    /// Replica at this index in the configured list.
    Replica(usize),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Replica(i) => write!(f, "replica-{i}"),
        }
    }
}

/// Stateless router over a fixed number of replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaRouter {
    replicas: usize,
}

impl ReplicaRouter {
    /// Router for `replicas` read replicas.
    #[must_use]
    pub const fn new(replicas: usize) -> Self {
        Self { replicas }
    }

    /// Chooses a route using the thread-local RNG.
    #[must_use]
    pub fn route(&self, kind: OperationKind) -> Route {
        self.route_with(kind, &mut rand::thread_rng())
    }

    /// Chooses a route using `rng`.
    pub fn route_with<R: Rng + ?Sized>(&self, kind: OperationKind, rng: &mut R) -> Route {
        match kind {
            OperationKind::Write => Route::Primary,
            OperationKind::Read if self.replicas == 0 => Route::Primary,
            OperationKind::Read => Route::Replica(rng.gen_range(0..self.replicas)),
        }
    }
}
