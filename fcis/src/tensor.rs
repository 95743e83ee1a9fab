//! The host materialization boundary.
//!
//! Score volumes may live on an accelerator. Everything that indexes by box
//! geometry on the host (mask binarization, aggregation, metrics) reads
//! tensors through [ToHost], which blocks until the data is copied into host
//! memory.

use crate::common::*;

pub trait ToHost {
    /// Copies the tensor into a host-resident `f32` array of the same shape.
    fn to_host(&self) -> Result<ArrayD<f32>>;

    fn to_host_1d(&self) -> Result<Array1<f32>> {
        Ok(self.to_host()?.into_dimensionality()?)
    }

    fn to_host_2d(&self) -> Result<Array2<f32>> {
        Ok(self.to_host()?.into_dimensionality()?)
    }

    fn to_host_scalar(&self) -> Result<f32> {
        let array = self.to_host()?;
        ensure!(
            array.len() == 1,
            "expect a single-element tensor, but get shape {:?}",
            array.shape()
        );
        Ok(array.iter().next().copied().unwrap_or_default())
    }
}

impl ToHost for Tensor {
    fn to_host(&self) -> Result<ArrayD<f32>> {
        let shape: Vec<usize> = self.size().into_iter().map(|size| size as usize).collect();
        let flat = self
            .detach()
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous()
            .view([-1]);
        let data = Vec::<f32>::from(&flat);
        let array = ArrayD::from_shape_vec(IxDyn(&shape), data)?;
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_copy_keeps_shape_and_order() -> Result<()> {
        let tensor = Tensor::of_slice(&[0f32, 1., 2., 3., 4., 5.]).view([2, 3]);
        let host = tensor.to_host_2d()?;
        assert_eq!(host.dim(), (2, 3));
        assert_eq!(host[[1, 0]], 3.0);
        assert_eq!(host[[0, 2]], 2.0);

        // transposed tensors are copied in logical order
        let transposed = tensor.transpose(0, 1).to_host_2d()?;
        assert_eq!(transposed.dim(), (3, 2));
        assert_eq!(transposed[[2, 1]], 5.0);
        Ok(())
    }

    #[test]
    fn host_scalar() -> Result<()> {
        let tensor = Tensor::of_slice(&[1.5f32, 2.5]).sum(Kind::Float);
        assert_eq!(tensor.to_host_scalar()?, 4.0);
        assert!(Tensor::of_slice(&[1f32, 2.]).to_host_scalar().is_err());
        Ok(())
    }
}
