// Public handlers sit outside the tenant guard; everything else is reachable
// only through it.
pub mod data;
pub mod find;
pub mod public;
pub mod tenant;
