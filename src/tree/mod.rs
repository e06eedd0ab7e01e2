//! XML Tree Model (C1).
//!
//! `raw` is the namespace-agnostic element tree every XAdES type renders to
//! and parses from; `xades` is the set of typed XAdES elements themselves.

pub mod raw;
pub mod xades;

pub use raw::XmlElement;
