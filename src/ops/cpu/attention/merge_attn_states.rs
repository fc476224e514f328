//! CPU implementation of MergeAttnStatesOps
//!
//! Stages tensors through f32 host buffers and runs the rayon merge kernel.
//! Half-precision inputs are promoted once on the way in and demoted once on
//! the way out, which is the same rounding the in-place kernel applies.

use crate::config::MergeConfig;
use crate::error::{Error, Result};
use crate::ops::cpu::kernels::StorageFormat;
use crate::ops::cpu::states::{AttnStates, AttnStatesMut, MergeShape, merge_attn_states};
use crate::ops::traits::MergeAttnStatesOps;
use numr::dtype::DType;
use numr::ops::TypeConversionOps;
use numr::runtime::cpu::{CpuClient, CpuRuntime};
use numr::tensor::Tensor;

fn check_shape(arg: &'static str, tensor: &Tensor<CpuRuntime>, expected: &[usize]) -> Result<()> {
    if tensor.shape() != expected {
        return Err(Error::ShapeMismatch {
            arg,
            expected: expected.to_vec(),
            got: tensor.shape().to_vec(),
        });
    }
    Ok(())
}

fn check_lse_dtype(lse: &Tensor<CpuRuntime>) -> Result<()> {
    if lse.dtype() != DType::F32 {
        return Err(Error::DTypeMismatch {
            expected: DType::F32,
            got: lse.dtype(),
        });
    }
    Ok(())
}

/// Copy a tensor into a contiguous f32 host buffer.
fn to_f32_vec(client: &CpuClient, tensor: &Tensor<CpuRuntime>) -> Result<Vec<f32>> {
    let tensor = if tensor.dtype() != DType::F32 {
        client.cast(tensor, DType::F32).map_err(Error::Numr)?
    } else {
        tensor.clone()
    };
    Ok(tensor.contiguous().to_vec::<f32>())
}

impl MergeAttnStatesOps<CpuRuntime> for CpuClient {
    fn merge_attn_states_with_config(
        &self,
        prefix_output: &Tensor<CpuRuntime>,
        prefix_lse: &Tensor<CpuRuntime>,
        suffix_output: &Tensor<CpuRuntime>,
        suffix_lse: &Tensor<CpuRuntime>,
        config: &MergeConfig,
    ) -> Result<(Tensor<CpuRuntime>, Tensor<CpuRuntime>)> {
        let dtype = prefix_output.dtype();
        let format = StorageFormat::from_dtype(dtype)?;
        if suffix_output.dtype() != dtype {
            return Err(Error::DTypeMismatch {
                expected: dtype,
                got: suffix_output.dtype(),
            });
        }
        check_lse_dtype(prefix_lse)?;
        check_lse_dtype(suffix_lse)?;

        let out_shape = prefix_output.shape().to_vec();
        if out_shape.len() != 3 {
            return Err(Error::InvalidArgument {
                arg: "prefix_output",
                reason: format!(
                    "expected [num_tokens, num_heads, head_size], got {:?}",
                    out_shape
                ),
            });
        }
        let shape = MergeShape::new(out_shape[0], out_shape[1], out_shape[2]);
        check_shape("suffix_output", suffix_output, &out_shape)?;
        let lse_shape = [shape.num_heads, shape.num_tokens];
        check_shape("prefix_lse", prefix_lse, &lse_shape)?;
        check_shape("suffix_lse", suffix_lse, &lse_shape)?;

        // Pack alignment is checked against the storage dtype, not the f32 staging buffers.
        format.check_head_size(shape.head_size)?;
        let (vector_len, lse_len) = shape.checked_lens()?;

        let p_out = to_f32_vec(self, prefix_output)?;
        let s_out = to_f32_vec(self, suffix_output)?;
        let p_lse = to_f32_vec(self, prefix_lse)?;
        let s_lse = to_f32_vec(self, suffix_lse)?;

        let mut out = vec![0.0f32; vector_len];
        let mut out_lse = vec![0.0f32; lse_len];
        merge_attn_states(
            AttnStatesMut::F32(&mut out),
            Some(&mut out_lse),
            AttnStates::F32(&p_out),
            &p_lse,
            AttnStates::F32(&s_out),
            &s_lse,
            shape,
            config,
        )?;

        let device = prefix_output.device();
        let output = Tensor::<CpuRuntime>::from_slice(&out, &out_shape, device);
        let output = if dtype != DType::F32 {
            self.cast(&output, dtype).map_err(Error::Numr)?
        } else {
            output
        };
        let output_lse = Tensor::<CpuRuntime>::from_slice(&out_lse, &lse_shape, device);

        Ok((output, output_lse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::cpu_setup;

    #[test]
    fn test_concrete_scenario() {
        let (client, device) = cpu_setup();
        let p = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[1, 1, 4], &device);
        let s = Tensor::<CpuRuntime>::from_slice(&[5.0f32, 6.0, 7.0, 8.0], &[1, 1, 4], &device);
        let lse = Tensor::<CpuRuntime>::from_slice(&[0.0f32], &[1, 1], &device);

        let (out, out_lse) = client.merge_attn_states(&p, &lse, &s, &lse).unwrap();

        assert_eq!(out.shape(), &[1, 1, 4]);
        assert_eq!(out.to_vec::<f32>(), vec![3.0, 4.0, 5.0, 6.0]);
        let l = out_lse.to_vec::<f32>();
        assert!((l[0] - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_unaligned_head_size() {
        let (client, device) = cpu_setup();
        let v = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 6], &[1, 1, 6], &device);
        let lse = Tensor::<CpuRuntime>::from_slice(&[0.0f32], &[1, 1], &device);

        let err = client.merge_attn_states(&v, &lse, &v, &lse).unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(
            err,
            Error::HeadSizeNotPackAligned {
                head_size: 6,
                pack_width: 4,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_integer_states() {
        let (client, device) = cpu_setup();
        let v = Tensor::<CpuRuntime>::from_slice(&[0i32; 4], &[1, 1, 4], &device);
        let lse = Tensor::<CpuRuntime>::from_slice(&[0.0f32], &[1, 1], &device);

        let err = client.merge_attn_states(&v, &lse, &v, &lse).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDType { dtype } if dtype == DType::I32));
    }

    #[test]
    fn test_rejects_transposed_lse() {
        let (client, device) = cpu_setup();
        let v = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 8], &[2, 1, 4], &device);
        let lse = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 2], &[2, 1], &device);

        let err = client.merge_attn_states(&v, &lse, &v, &lse).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                arg: "prefix_lse",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_rank_two_states() {
        let (client, device) = cpu_setup();
        let v = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 8], &[2, 4], &device);
        let lse = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 2], &[1, 2], &device);

        let err = client.merge_attn_states(&v, &lse, &v, &lse).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument {
                arg: "prefix_output",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_head_size() {
        let (client, device) = cpu_setup();
        let v = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 0], &[2, 1, 0], &device);
        let lse = Tensor::<CpuRuntime>::from_slice(&[0.0f32; 2], &[1, 2], &device);

        let err = client.merge_attn_states(&v, &lse, &v, &lse).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument {
                arg: "head_size",
                ..
            }
        ));
    }
}
