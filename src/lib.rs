//! Post-processing of liquid-argon TPC reconstruction output: build physics
//! objects from the chain products, refine them with post-processors and
//! run analysis selections over them.

pub mod ana;
pub mod build;
pub mod data;
pub mod error;
pub mod objects;
pub mod pipeline;
pub mod post;

pub use build::{load_match_pairs, BuildConfig, BuildManager};
pub use data::batch::{Batch, Entry, FieldUpdate, Index, Product};
pub use error::{RecoError, RecoResult};
pub use pipeline::{Pipeline, PipelineConfig};
pub use post::PostManager;
