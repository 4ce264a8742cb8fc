pub mod api;
pub mod controllers;
pub mod scope;
pub mod store;
pub mod util;

#[cfg(test)]
pub mod fixtures;
