//! GPU resources bound to kernel slots, host-side data, and `run` arguments.

use std::collections::BTreeMap;

use log::debug;

use crate::error::{GpuError, Result};
use crate::registry::{Dimensionality, HostScalar};
use crate::wgpu_backend::{DeviceBuffer, DeviceTexture};

/// Who is responsible for a slot's resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Allocated by the kernel handle.
    Owned,
    /// Adopted from the caller; never destroyed by the handle.
    Borrowed,
}

/// A buffer or texture handle.
#[derive(Debug, Clone)]
pub enum GpuResource {
    Buffer(DeviceBuffer),
    Texture(DeviceTexture),
}

impl GpuResource {
    pub fn id(&self) -> usize {
        match self {
            GpuResource::Buffer(buf) => buf.id(),
            GpuResource::Texture(tex) => tex.id(),
        }
    }

    pub fn dims(&self) -> Dimensionality {
        match self {
            GpuResource::Buffer(_) => Dimensionality::Buffer,
            GpuResource::Texture(_) => Dimensionality::Image,
        }
    }

    pub fn as_buffer(&self) -> Option<&DeviceBuffer> {
        match self {
            GpuResource::Buffer(buf) => Some(buf),
            GpuResource::Texture(_) => None,
        }
    }

    pub fn as_texture(&self) -> Option<&DeviceTexture> {
        match self {
            GpuResource::Texture(tex) => Some(tex),
            GpuResource::Buffer(_) => None,
        }
    }
}

/// The resource currently bound to a slot, with its ownership tag.
#[derive(Debug, Clone)]
pub struct BoundResource {
    pub resource: GpuResource,
    pub ownership: Ownership,
}

impl BoundResource {
    pub fn owned(resource: GpuResource) -> Self {
        BoundResource {
            resource,
            ownership: Ownership::Owned,
        }
    }

    pub fn borrowed(resource: GpuResource) -> Self {
        BoundResource {
            resource,
            ownership: Ownership::Borrowed,
        }
    }

    /// Drop the handle's claim. Owned resources nobody else holds are destroyed.
    pub fn release(self) {
        if self.ownership != Ownership::Owned {
            return;
        }
        match &self.resource {
            GpuResource::Buffer(buf) if buf.is_unique() => {
                debug!("destroying replaced buffer ({} bytes)", buf.byte_size());
                buf.destroy();
            }
            GpuResource::Texture(tex) if tex.is_unique() => {
                debug!("destroying replaced {}x{} texture", tex.width(), tex.height());
                tex.destroy();
            }
            _ => {}
        }
    }
}

/// Data read back from a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    U8(Vec<u8>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl HostData {
    /// Decode raw bytes; a trailing partial element is dropped.
    pub fn from_bytes(bytes: &[u8], scalar: HostScalar) -> Self {
        let whole = bytes.len() - bytes.len() % scalar.byte_size();
        let bytes = &bytes[..whole];
        match scalar {
            HostScalar::U8 => HostData::U8(bytes.to_vec()),
            HostScalar::U32 => HostData::U32(bytemuck::pod_collect_to_vec(bytes)),
            HostScalar::I32 => HostData::I32(bytemuck::pod_collect_to_vec(bytes)),
            HostScalar::F32 => HostData::F32(bytemuck::pod_collect_to_vec(bytes)),
            HostScalar::F64 => HostData::F64(bytemuck::pod_collect_to_vec(bytes)),
        }
    }

    pub fn scalar(&self) -> HostScalar {
        match self {
            HostData::U8(_) => HostScalar::U8,
            HostData::U32(_) => HostScalar::U32,
            HostData::I32(_) => HostScalar::I32,
            HostData::F32(_) => HostScalar::F32,
            HostData::F64(_) => HostScalar::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostData::U8(v) => v.len(),
            HostData::U32(v) => v.len(),
            HostData::I32(v) => v.len(),
            HostData::F32(v) => v.len(),
            HostData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            HostData::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<&[u32]> {
        match self {
            HostData::U32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            HostData::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            HostData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            HostData::F64(v) => Some(v),
            _ => None,
        }
    }
}

/// Borrowed host numbers to upload into a buffer slot.
#[derive(Debug, Clone, Copy)]
pub enum HostSlice<'a> {
    U8(&'a [u8]),
    U32(&'a [u32]),
    I32(&'a [i32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl<'a> HostSlice<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        match *self {
            HostSlice::U8(v) => v,
            HostSlice::U32(v) => bytemuck::cast_slice(v),
            HostSlice::I32(v) => bytemuck::cast_slice(v),
            HostSlice::F32(v) => bytemuck::cast_slice(v),
            HostSlice::F64(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }
}

/// An RGBA8 image, row-major with no row padding.
#[derive(Debug, Clone, Copy)]
pub struct ImageData<'a> {
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

impl<'a> ImageData<'a> {
    pub fn new(width: u32, height: u32, pixels: &'a [u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || width == 0 || height == 0 {
            return Err(GpuError::usage(format!(
                "a {}x{} RGBA8 image needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(ImageData {
            width,
            height,
            pixels,
        })
    }
}

/// Uniform values keyed by uniform name. Up to four values each.
pub type UniformMap = BTreeMap<String, Vec<f64>>;

/// One argument to [`KernelHandle::run`](crate::kernel::KernelHandle::run).
#[derive(Debug, Clone)]
pub enum KernelArg<'a> {
    /// Keep the slot's resource, allocating one if the slot is empty.
    Null,
    Buffer(DeviceBuffer),
    Texture(DeviceTexture),
    Host(HostSlice<'a>),
    Image(ImageData<'a>),
    /// One of three trailing workgroup counts.
    Group(u32),
    Uniforms(UniformMap),
}

impl KernelArg<'_> {
    fn kind(&self) -> &'static str {
        match self {
            KernelArg::Null => "null",
            KernelArg::Buffer(_) => "buffer",
            KernelArg::Texture(_) => "texture",
            KernelArg::Host(_) => "host data",
            KernelArg::Image(_) => "image",
            KernelArg::Group(_) => "group count",
            KernelArg::Uniforms(_) => "uniform map",
        }
    }

    /// Dimensionality the argument carries, if it carries one.
    pub fn dims(&self) -> Option<Dimensionality> {
        match self {
            KernelArg::Buffer(_) | KernelArg::Host(_) => Some(Dimensionality::Buffer),
            KernelArg::Texture(_) | KernelArg::Image(_) => Some(Dimensionality::Image),
            _ => None,
        }
    }
}

macro_rules! host_slice_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl<'a> From<&'a [$ty]> for HostSlice<'a> {
                fn from(v: &'a [$ty]) -> Self {
                    HostSlice::$variant(v)
                }
            }

            impl<'a> From<&'a [$ty]> for KernelArg<'a> {
                fn from(v: &'a [$ty]) -> Self {
                    KernelArg::Host(HostSlice::$variant(v))
                }
            }

            impl<'a> From<&'a Vec<$ty>> for KernelArg<'a> {
                fn from(v: &'a Vec<$ty>) -> Self {
                    KernelArg::Host(HostSlice::$variant(v))
                }
            }
        )*
    };
}

host_slice_from!(u8 => U8, u32 => U32, i32 => I32, f32 => F32, f64 => F64);

impl From<DeviceBuffer> for KernelArg<'_> {
    fn from(v: DeviceBuffer) -> Self {
        KernelArg::Buffer(v)
    }
}

impl From<&DeviceBuffer> for KernelArg<'_> {
    fn from(v: &DeviceBuffer) -> Self {
        KernelArg::Buffer(v.clone())
    }
}

impl From<DeviceTexture> for KernelArg<'_> {
    fn from(v: DeviceTexture) -> Self {
        KernelArg::Texture(v)
    }
}

impl From<&DeviceTexture> for KernelArg<'_> {
    fn from(v: &DeviceTexture) -> Self {
        KernelArg::Texture(v.clone())
    }
}

impl<'a> From<ImageData<'a>> for KernelArg<'a> {
    fn from(v: ImageData<'a>) -> Self {
        KernelArg::Image(v)
    }
}

impl From<UniformMap> for KernelArg<'_> {
    fn from(v: UniformMap) -> Self {
        KernelArg::Uniforms(v)
    }
}

/// `run` arguments split into parameters and optional trailers.
#[derive(Debug)]
pub struct RunArgs<'a> {
    pub params: Vec<KernelArg<'a>>,
    pub groups: Option<[u32; 3]>,
    pub uniforms: Option<UniformMap>,
}

/// Split `args` for a kernel with `param_count` parameters.
///
/// Accepted shapes: N params, N + uniform map, N + 3 group counts,
/// N + 3 group counts + uniform map.
pub fn split_run_args(param_count: usize, mut args: Vec<KernelArg<'_>>) -> Result<RunArgs<'_>> {
    let arity_error = |got: usize| {
        GpuError::usage(format!(
            "kernel takes {} arguments, optionally followed by 3 group counts and/or a uniform map; got {}",
            param_count, got
        ))
    };
    let total = args.len();
    if total < param_count || total > param_count + 4 {
        return Err(arity_error(total));
    }

    let uniforms = match args.last() {
        Some(KernelArg::Uniforms(_)) if total > param_count => match args.pop() {
            Some(KernelArg::Uniforms(map)) => Some(map),
            _ => None,
        },
        _ => None,
    };

    let groups = match args.len() - param_count {
        0 => None,
        3 => {
            let mut counts = [0u32; 3];
            for (slot, arg) in counts.iter_mut().zip(args.drain(param_count..)) {
                match arg {
                    KernelArg::Group(n) => *slot = n,
                    other => {
                        return Err(GpuError::usage(format!(
                            "expected a group count after the parameters, got {}",
                            other.kind()
                        )))
                    }
                }
            }
            Some(counts)
        }
        _ => return Err(arity_error(total)),
    };

    if let Some((index, arg)) = args
        .iter()
        .enumerate()
        .find(|(_, arg)| matches!(arg, KernelArg::Group(_) | KernelArg::Uniforms(_)))
    {
        return Err(GpuError::usage(format!(
            "argument {} is a {}, expected a parameter value",
            index,
            arg.kind()
        )));
    }

    Ok(RunArgs {
        params: args,
        groups,
        uniforms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniforms() -> KernelArg<'static> {
        let mut map = UniformMap::new();
        map.insert("MNK".into(), vec![64.0, 64.0, 64.0, 0.0]);
        KernelArg::Uniforms(map)
    }

    #[test]
    fn test_arity_shapes() {
        let a = [1.0f32; 4];
        let split = split_run_args(2, vec![(&a[..]).into(), KernelArg::Null]).unwrap();
        assert_eq!(split.params.len(), 2);
        assert!(split.groups.is_none() && split.uniforms.is_none());

        let split = split_run_args(2, vec![KernelArg::Null, KernelArg::Null, uniforms()]).unwrap();
        assert!(split.uniforms.unwrap().contains_key("MNK"));

        let split = split_run_args(
            1,
            vec![KernelArg::Null, KernelArg::Group(4), KernelArg::Group(2), KernelArg::Group(1)],
        )
        .unwrap();
        assert_eq!(split.groups, Some([4, 2, 1]));

        let split = split_run_args(
            1,
            vec![
                KernelArg::Null,
                KernelArg::Group(4),
                KernelArg::Group(2),
                KernelArg::Group(1),
                uniforms(),
            ],
        )
        .unwrap();
        assert_eq!(split.params.len(), 1);
        assert_eq!(split.groups, Some([4, 2, 1]));
        assert!(split.uniforms.is_some());
    }

    #[test]
    fn test_bad_arity_is_usage_error() {
        for args in [
            vec![],
            vec![KernelArg::Null, KernelArg::Null, KernelArg::Group(1)],
            vec![KernelArg::Null; 7],
        ] {
            assert!(matches!(split_run_args(2, args), Err(GpuError::Usage(_))));
        }
    }

    #[test]
    fn test_trailers_must_have_the_right_kind() {
        let args = vec![KernelArg::Null, KernelArg::Null, KernelArg::Null, KernelArg::Null];
        assert!(matches!(split_run_args(1, args), Err(GpuError::Usage(_))));

        let args = vec![KernelArg::Group(3)];
        assert!(matches!(split_run_args(1, args), Err(GpuError::Usage(_))));
    }

    #[test]
    fn test_host_data_decoding() {
        let values = [1.5f32, -2.0, 3.25];
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        assert_eq!(
            HostData::from_bytes(bytes, HostScalar::F32).as_f32(),
            Some(&values[..])
        );
        let with_tail = [bytes, &[0xff][..]].concat();
        assert_eq!(HostData::from_bytes(&with_tail, HostScalar::F32).len(), 3);
        assert_eq!(HostData::from_bytes(bytes, HostScalar::U8).len(), 12);
    }

    #[test]
    fn test_image_data_checks_length() {
        let pixels = vec![0u8; 2 * 2 * 4];
        assert!(ImageData::new(2, 2, &pixels).is_ok());
        assert!(ImageData::new(3, 2, &pixels).is_err());
    }

    #[test]
    fn test_host_slice_bytes() {
        let v = vec![1u32, 2, 3];
        let arg: KernelArg = (&v).into();
        match arg {
            KernelArg::Host(slice) => assert_eq!(slice.byte_len(), 12),
            other => panic!("unexpected {:?}", other),
        }
    }
}
