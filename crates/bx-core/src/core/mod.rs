pub(crate) mod config;
pub(crate) mod plugin;
pub(crate) mod project;
pub(crate) mod reconcile;
pub(crate) mod runtime;
pub(crate) mod store;
pub(crate) mod sync;
#[cfg(test)]
pub(crate) mod testing;
pub(crate) mod tooling;
