//! The measurement pipeline, in sweep order: open-circuit scan, Isc
//! stabilization, axis scale derivation, then the sweep loop proper.

pub mod isc_poll;
pub mod scales;
pub mod sweep;
pub mod voc_scan;
