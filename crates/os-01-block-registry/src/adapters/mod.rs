//! # Adapters Layer
//!
//! Region providers implementing the outbound `RegionProvider` port.

pub mod region;
