//! Reassembly of per-rank output tiles into one global image.

use crate::decomp::Decomposition;
use crate::error::{Result, SobelError};
use crate::image::GlobalImage;

/// Coordinator-side inverse of the decomposition.
///
/// Starts from a zeroed N×N image and writes each rank's packed output
/// block at the origin named by that rank's descriptor.
pub struct ResultAssembler<'a> {
    decomp: &'a Decomposition,
    image: GlobalImage,
    placed: Vec<bool>,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(decomp: &'a Decomposition) -> Self {
        Self {
            decomp,
            image: GlobalImage::zeroed(decomp.n()),
            placed: vec![false; decomp.blocks().len()],
        }
    }

    /// Write rank `rank`'s packed output block.
    pub fn place(&mut self, rank: usize, payload: &[u8]) -> Result<()> {
        let block = self.decomp.block(rank)?;
        if payload.len() != block.len() {
            return Err(SobelError::Communication(format!(
                "rank {rank} output has {} cells, expected {}",
                payload.len(),
                block.len()
            )));
        }
        if std::mem::replace(&mut self.placed[rank], true) {
            return Err(SobelError::Communication(format!(
                "rank {rank} output delivered twice"
            )));
        }
        block.unpack_into_image(payload, &mut self.image);
        Ok(())
    }

    /// The assembled image; fails if any rank is missing.
    pub fn finish(self) -> Result<GlobalImage> {
        if let Some(missing) = self.placed.iter().position(|&p| !p) {
            return Err(SobelError::Communication(format!(
                "output of rank {missing} never arrived"
            )));
        }
        Ok(self.image)
    }
}
