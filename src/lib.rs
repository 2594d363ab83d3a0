pub mod assemble;
pub mod baseline;
pub mod comm;
pub mod coordinator;
pub mod decomp;
pub mod error;
pub mod halo;
pub mod image;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod stats;
pub mod stencil;
pub mod tile;
pub mod topology;
