//! # Strata Materials
//!
//! Tabulated, frequency-sampled permittivities for the Strata solver. Every
//! material is a list of angular frequencies paired with one permittivity
//! sample per frequency. A sample is a scalar, a diagonal tensor, or a full
//! in-plane tensor; [`EpsilonTensor`](permittivity::EpsilonTensor) is the
//! canonical five-component form all of them widen into.
//!
//! ## Sign convention
//!
//! Values held by a [`Material`](material::Material) use the solver's
//! internal convention, in which a lossy medium has a *negative* imaginary
//! part. Data files use the opposite convention; [`loader`] flips the sign
//! on the way in.
//!
//! ## Modules
//!
//! - [`permittivity`]: Sample kinds and the canonical tensor.
//! - [`material`]: The material record and its error type.
//! - [`loader`]: Whitespace-separated permittivity tables.

pub mod loader;
pub mod material;
pub mod permittivity;

pub use loader::load_permittivity;
pub use material::{Material, MaterialError};
pub use permittivity::{EpsilonTensor, Permittivity, PermittivityKind};
