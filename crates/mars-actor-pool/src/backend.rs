//! The actor-backend seam (§6): a backend registers under a scheme prefix (`mars://`, `ray://`,
//! ...) and supplies what a caller needs to address and stand up a pool of its kind. This crate
//! ships exactly one backend -- the in-process [`crate::pool::MainActorPool`] under the `mars`
//! scheme -- but keeps the trait so a second backend (a real multi-process or Ray-backed one)
//! has somewhere to plug in without touching the planner or task manager.

/// What a caller needs to know about a registered backend: its scheme prefix for address
/// parsing, and a human-readable name for diagnostics.
pub trait ActorBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn scheme(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MarsBackend;

    #[test]
    fn mars_backend_advertises_its_scheme() {
        let backend = MarsBackend;
        assert_eq!(backend.scheme(), "mars");
        assert_eq!(backend.name(), "mars");
    }
}
