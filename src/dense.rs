//! Flat, owned `f32` tensors in `[z][y][x]` (volumes) and `[y][x]` (slices) order, with the
//! operators used to condition data before surface extraction.
//!
//! Indexing is unchecked beyond the slice bounds check; callers own the coordinates they pass.

use crate::VolumeError;

use itertools::iproduct;

fn try_alloc(len: usize, value: f32) -> Result<Vec<f32>, VolumeError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| VolumeError::Allocation { len })?;
    data.resize(len, value);

    Ok(data)
}

fn checked_len(dims: &[usize]) -> Result<usize, VolumeError> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).ok_or(
        VolumeError::Allocation { len: usize::MAX },
    )
}

fn min_max_of(data: &[f32]) -> Option<(f32, f32)> {
    let mut iter = data.iter().copied();
    let first = iter.next()?;

    Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

fn normalize_in_place(data: &mut [f32]) {
    let (lo, hi) = match min_max_of(data) {
        Some(range) => range,
        None => return,
    };
    if hi == lo {
        data.iter_mut().for_each(|v| *v = 0.5);
        return;
    }

    let scale = 1.0 / (hi - lo);
    data.iter_mut().for_each(|v| *v = (*v - lo) * scale);
}

fn check_kernel(size: usize) -> Result<(), VolumeError> {
    if size == 0 || size % 2 == 0 {
        return Err(VolumeError::InvalidKernel(size));
    }

    Ok(())
}

/// Window `[o * stride, o * stride + kernel)` clipped to `[0, len)`.
#[inline]
fn pool_window(o: usize, kernel: usize, stride: usize, len: usize) -> std::ops::Range<usize> {
    let start = o * stride;

    start..(start + kernel).min(len)
}

/// `ceil(len / stride)`
#[inline]
fn pooled_len(len: usize, stride: usize) -> usize {
    (len + stride - 1) / stride
}

/// Offsets in `[0, len)` that kernel tap `k` (centered on `center`) reaches from `i`.
#[inline]
fn tap(i: usize, k: usize, center: usize, len: usize) -> Option<usize> {
    let j = (i + k).checked_sub(center)?;

    if j < len {
        Some(j)
    } else {
        None
    }
}

#[derive(Clone, Copy)]
enum Reduce {
    Sum,
    Avg,
    Max,
}

/// A 3D scalar field. `dims` is `[z, y, x]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseVolume {
    dims: [usize; 3],
    data: Vec<f32>,
}

impl DenseVolume {
    pub fn try_zeros(dims: [usize; 3]) -> Result<Self, VolumeError> {
        Self::filled(dims, 0.0)
    }

    pub fn filled(dims: [usize; 3], value: f32) -> Result<Self, VolumeError> {
        let data = try_alloc(checked_len(&dims)?, value)?;

        Ok(DenseVolume { dims, data })
    }

    /// Takes ownership of `data`, which must already be laid out `[z][y][x]`.
    pub fn from_vec(dims: [usize; 3], data: Vec<f32>) -> Result<Self, VolumeError> {
        let expected = checked_len(&dims)?;
        if data.len() != expected {
            return Err(VolumeError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(DenseVolume { dims, data })
    }

    /// Samples `f(z, y, x)` at every voxel.
    pub fn from_fn(
        dims: [usize; 3],
        f: impl Fn(usize, usize, usize) -> f32,
    ) -> Result<Self, VolumeError> {
        let mut volume = Self::try_zeros(dims)?;
        for ((z, y, x), v) in iproduct!(0..dims[0], 0..dims[1], 0..dims[2]).zip(&mut volume.data)
        {
            *v = f(z, y, x);
        }

        Ok(volume)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn index(&self, z: usize, y: usize, x: usize) -> usize {
        z * self.dims[1] * self.dims[2] + y * self.dims[2] + x
    }

    #[inline]
    pub fn get(&self, z: usize, y: usize, x: usize) -> f32 {
        self.data[self.index(z, y, x)]
    }

    #[inline]
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: f32) {
        let i = self.index(z, y, x);
        self.data[i] = value;
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max_of(&self.data)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        DenseVolume {
            dims: self.dims,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    fn pool(&self, kernel: usize, stride: usize, reduce: Reduce) -> Result<Self, VolumeError> {
        if kernel == 0 || stride == 0 {
            return Err(VolumeError::InvalidPooling { kernel, stride });
        }

        let [dz, dy, dx] = self.dims;
        let out_dims = [
            pooled_len(dz, stride),
            pooled_len(dy, stride),
            pooled_len(dx, stride),
        ];
        let mut out = Self::try_zeros(out_dims)?;

        for ((oz, oy, ox), o) in
            iproduct!(0..out_dims[0], 0..out_dims[1], 0..out_dims[2]).zip(&mut out.data)
        {
            let mut acc = match reduce {
                Reduce::Max => f32::NEG_INFINITY,
                _ => 0.0,
            };
            let mut count = 0usize;
            for (z, y, x) in iproduct!(
                pool_window(oz, kernel, stride, dz),
                pool_window(oy, kernel, stride, dy),
                pool_window(ox, kernel, stride, dx)
            ) {
                let v = self.get(z, y, x);
                acc = match reduce {
                    Reduce::Max => acc.max(v),
                    _ => acc + v,
                };
                count += 1;
            }

            // Every window holds at least its first sample.
            *o = match reduce {
                Reduce::Avg => acc / count as f32,
                _ => acc,
            };
        }

        Ok(out)
    }

    /// Sum over each `kernel³` window, stepping by `stride`. The output has
    /// `ceil(dim / stride)` samples per axis; window samples past the input edge are skipped.
    pub fn sumpool(&self, kernel: usize, stride: usize) -> Result<Self, VolumeError> {
        self.pool(kernel, stride, Reduce::Sum)
    }

    /// Like `sumpool`, divided by the number of in-range samples in each window.
    pub fn avgpool(&self, kernel: usize, stride: usize) -> Result<Self, VolumeError> {
        self.pool(kernel, stride, Reduce::Avg)
    }

    pub fn maxpool(&self, kernel: usize, stride: usize) -> Result<Self, VolumeError> {
        self.pool(kernel, stride, Reduce::Max)
    }

    /// Correlates with `kernel` centered on each voxel (at `dims / 2`). Samples outside the
    /// volume count as zero.
    pub fn convolve3d(&self, kernel: &DenseVolume) -> Result<Self, VolumeError> {
        let [dz, dy, dx] = self.dims;
        let [kz, ky, kx] = kernel.dims;
        let (cz, cy, cx) = (kz / 2, ky / 2, kx / 2);
        let mut out = Self::try_zeros(self.dims)?;

        for ((z, y, x), o) in iproduct!(0..dz, 0..dy, 0..dx).zip(&mut out.data) {
            let mut sum = 0.0;
            for (i, j, k) in iproduct!(0..kz, 0..ky, 0..kx) {
                if let (Some(sz), Some(sy), Some(sx)) =
                    (tap(z, i, cz, dz), tap(y, j, cy, dy), tap(x, k, cx, dx))
                {
                    sum += self.get(sz, sy, sx) * kernel.get(i, j, k);
                }
            }
            *o = sum;
        }

        Ok(out)
    }

    /// Mean over a `size³` cube around each voxel, zero padded. `size` must be odd.
    pub fn box_blur(&self, size: usize) -> Result<Self, VolumeError> {
        check_kernel(size)?;
        let weight = 1.0 / (size * size * size) as f32;

        self.convolve3d(&Self::filled([size; 3], weight)?)
    }

    /// `input + amount * (input - box_blur(input, size))`
    pub fn unsharp_mask(&self, amount: f32, size: usize) -> Result<Self, VolumeError> {
        let mut out = self.box_blur(size)?;
        for (o, &v) in out.data.iter_mut().zip(&self.data) {
            *o = v + amount * (v - *o);
        }

        Ok(out)
    }

    /// Rescales to `[0, 1]` by the global min and max. A constant volume becomes all `0.5`.
    pub fn normalize(&mut self) {
        normalize_in_place(&mut self.data);
    }

    /// Reorders axes. `layout[i]` names the source axis (`'z'`, `'y'` or `'x'`) that becomes
    /// output axis `i`, so `"zyx"` is the identity and `"xyz"` swaps `z` and `x`.
    pub fn transpose(&self, layout: &str) -> Result<Self, VolumeError> {
        let invalid = || VolumeError::InvalidLayout(layout.to_string());

        let mut perm = [0usize; 3];
        let mut seen = [false; 3];
        let mut chars = layout.chars();
        for p in perm.iter_mut() {
            let axis = match chars.next() {
                Some('z') => 0,
                Some('y') => 1,
                Some('x') => 2,
                _ => return Err(invalid()),
            };
            if seen[axis] {
                return Err(invalid());
            }
            seen[axis] = true;
            *p = axis;
        }
        if chars.next().is_some() {
            return Err(invalid());
        }

        let out_dims = [self.dims[perm[0]], self.dims[perm[1]], self.dims[perm[2]]];
        let mut out = Self::try_zeros(out_dims)?;
        for ((a, b, c), o) in
            iproduct!(0..out_dims[0], 0..out_dims[1], 0..out_dims[2]).zip(&mut out.data)
        {
            let mut src = [0usize; 3];
            src[perm[0]] = a;
            src[perm[1]] = b;
            src[perm[2]] = c;
            *o = self.get(src[0], src[1], src[2]);
        }

        Ok(out)
    }

    /// Copies out the image at depth `z`.
    pub fn slice_z(&self, z: usize) -> Result<DenseSlice, VolumeError> {
        let [_, dy, dx] = self.dims;
        let start = self.index(z, 0, 0);
        let mut data = Vec::new();
        data.try_reserve_exact(dy * dx)
            .map_err(|_| VolumeError::Allocation { len: dy * dx })?;
        data.extend_from_slice(&self.data[start..start + dy * dx]);

        DenseSlice::from_vec([dy, dx], data)
    }

    /// Stacks equally sized slices along `z`.
    pub fn from_slices(slices: &[DenseSlice]) -> Result<Self, VolumeError> {
        let [dy, dx] = slices.first().map_or([0, 0], |s| s.dims);
        let len = checked_len(&[slices.len(), dy, dx])?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| VolumeError::Allocation { len })?;

        for slice in slices {
            if slice.dims != [dy, dx] {
                return Err(VolumeError::ShapeMismatch {
                    expected: dy * dx,
                    actual: slice.data.len(),
                });
            }
            data.extend_from_slice(&slice.data);
        }

        Ok(DenseVolume {
            dims: [slices.len(), dy, dx],
            data,
        })
    }
}

/// A 2D scalar field. `dims` is `[y, x]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseSlice {
    dims: [usize; 2],
    data: Vec<f32>,
}

impl DenseSlice {
    pub fn try_zeros(dims: [usize; 2]) -> Result<Self, VolumeError> {
        Self::filled(dims, 0.0)
    }

    pub fn filled(dims: [usize; 2], value: f32) -> Result<Self, VolumeError> {
        let data = try_alloc(checked_len(&dims)?, value)?;

        Ok(DenseSlice { dims, data })
    }

    pub fn from_vec(dims: [usize; 2], data: Vec<f32>) -> Result<Self, VolumeError> {
        let expected = checked_len(&dims)?;
        if data.len() != expected {
            return Err(VolumeError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(DenseSlice { dims, data })
    }

    pub fn dims(&self) -> [usize; 2] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn index(&self, y: usize, x: usize) -> usize {
        y * self.dims[1] + x
    }

    #[inline]
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.data[self.index(y, x)]
    }

    #[inline]
    pub fn set(&mut self, y: usize, x: usize, value: f32) {
        let i = self.index(y, x);
        self.data[i] = value;
    }

    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max_of(&self.data)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        DenseSlice {
            dims: self.dims,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// 2D counterpart of `DenseVolume::convolve3d`.
    pub fn convolve2d(&self, kernel: &DenseSlice) -> Result<Self, VolumeError> {
        let [dy, dx] = self.dims;
        let [ky, kx] = kernel.dims;
        let (cy, cx) = (ky / 2, kx / 2);
        let mut out = Self::try_zeros(self.dims)?;

        for ((y, x), o) in iproduct!(0..dy, 0..dx).zip(&mut out.data) {
            let mut sum = 0.0;
            for (j, k) in iproduct!(0..ky, 0..kx) {
                if let (Some(sy), Some(sx)) = (tap(y, j, cy, dy), tap(x, k, cx, dx)) {
                    sum += self.get(sy, sx) * kernel.get(j, k);
                }
            }
            *o = sum;
        }

        Ok(out)
    }

    pub fn box_blur(&self, size: usize) -> Result<Self, VolumeError> {
        check_kernel(size)?;
        let weight = 1.0 / (size * size) as f32;

        self.convolve2d(&Self::filled([size; 2], weight)?)
    }

    pub fn unsharp_mask(&self, amount: f32, size: usize) -> Result<Self, VolumeError> {
        let mut out = self.box_blur(size)?;
        for (o, &v) in out.data.iter_mut().zip(&self.data) {
            *o = v + amount * (v - *o);
        }

        Ok(out)
    }

    pub fn normalize(&mut self) {
        normalize_in_place(&mut self.data);
    }

    /// Swaps `y` and `x`.
    pub fn transpose(&self) -> Result<Self, VolumeError> {
        let [dy, dx] = self.dims;
        let mut out = Self::try_zeros([dx, dy])?;
        for ((x, y), o) in iproduct!(0..dx, 0..dy).zip(&mut out.data) {
            *o = self.get(y, x);
        }

        Ok(out)
    }

    /// Rounds and clamps every sample into `0..=255`.
    pub fn to_u8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| v.round().max(0.0).min(255.0) as u8)
            .collect()
    }
}

// ████████╗███████╗███████╗████████╗███████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝
//    ██║   █████╗  ███████╗   ██║   ███████╗
//    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║
//    ██║   ███████╗███████║   ██║   ███████║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sumpool_of_ones() {
        let ones = DenseVolume::filled([128; 3], 1.0).unwrap();

        let pooled = ones.sumpool(2, 2).unwrap();

        assert_eq!(pooled.dims(), [64; 3]);
        assert!(pooled.as_slice().iter().all(|&v| v == 8.0));
    }

    #[test]
    fn pooling_clips_windows_at_the_edge() {
        let ones = DenseVolume::filled([3, 3, 3], 1.0).unwrap();

        let sum = ones.sumpool(2, 2).unwrap();
        assert_eq!(sum.dims(), [2, 2, 2]);
        assert_eq!(sum.get(0, 0, 0), 8.0);
        assert_eq!(sum.get(1, 0, 0), 4.0);
        assert_eq!(sum.get(1, 1, 0), 2.0);
        assert_eq!(sum.get(1, 1, 1), 1.0);

        let avg = ones.avgpool(2, 2).unwrap();
        assert!(avg.as_slice().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn maxpool_picks_window_max() {
        let v = DenseVolume::from_fn([2, 2, 4], |z, y, x| (z * 8 + y * 4 + x) as f32).unwrap();

        let pooled = v.maxpool(2, 2).unwrap();

        assert_eq!(pooled.dims(), [1, 1, 2]);
        assert_eq!(pooled.as_slice(), &[13.0, 15.0]);
    }

    #[test]
    fn pooling_rejects_zero_stride() {
        let v = DenseVolume::try_zeros([2, 2, 2]).unwrap();

        assert!(matches!(
            v.sumpool(2, 0),
            Err(VolumeError::InvalidPooling { .. })
        ));
    }

    #[test]
    fn normalize_constant_is_half() {
        let mut v = DenseVolume::filled([4, 5, 6], 42.0).unwrap();

        v.normalize();

        assert!(v.as_slice().iter().all(|&x| x == 0.5));
    }

    #[test]
    fn normalize_spans_unit_interval() {
        let mut v = DenseVolume::from_vec([1, 1, 3], vec![-2.0, 0.0, 2.0]).unwrap();

        v.normalize();

        assert_eq!(v.as_slice(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn convolve_with_delta_is_identity() {
        let v = DenseVolume::from_fn([3, 4, 5], |z, y, x| (z + 2 * y + 3 * x) as f32).unwrap();
        let mut delta = DenseVolume::try_zeros([3, 3, 3]).unwrap();
        delta.set(1, 1, 1, 1.0);

        assert_eq!(v.convolve3d(&delta).unwrap(), v);
    }

    #[test]
    fn box_blur_zero_pads() {
        let ones = DenseVolume::filled([3, 3, 3], 1.0).unwrap();

        let blurred = ones.box_blur(3).unwrap();

        assert!((blurred.get(1, 1, 1) - 1.0).abs() < 1e-6);
        assert!((blurred.get(0, 0, 0) - 8.0 / 27.0).abs() < 1e-6);
        assert!(matches!(ones.box_blur(2), Err(VolumeError::InvalidKernel(2))));
    }

    #[test]
    fn unsharp_mask_leaves_flat_interior() {
        let v = DenseVolume::filled([5, 5, 5], 3.0).unwrap();

        let sharpened = v.unsharp_mask(1.5, 3).unwrap();

        assert!((sharpened.get(2, 2, 2) - 3.0).abs() < 1e-5);
        assert!(sharpened.get(0, 0, 0) > 3.0);
    }

    #[test]
    fn transpose_permutes_axes() {
        let v = DenseVolume::from_fn([2, 3, 4], |z, y, x| (100 * z + 10 * y + x) as f32).unwrap();

        assert_eq!(v.transpose("zyx").unwrap(), v);

        let t = v.transpose("xzy").unwrap();
        assert_eq!(t.dims(), [4, 2, 3]);
        assert_eq!(t.get(3, 1, 2), v.get(1, 2, 3));

        assert!(v.transpose("zzx").is_err());
        assert!(v.transpose("zy").is_err());
        assert!(v.transpose("zyxz").is_err());
    }

    #[test]
    fn slices_round_trip_through_stacking() {
        let v = DenseVolume::from_fn([3, 2, 2], |z, y, x| (z * 4 + y * 2 + x) as f32).unwrap();

        let slices: Vec<_> = (0..3).map(|z| v.slice_z(z).unwrap()).collect();
        assert_eq!(slices[2].as_slice(), &[8.0, 9.0, 10.0, 11.0]);
        assert_eq!(DenseVolume::from_slices(&slices).unwrap(), v);

        let odd = DenseSlice::try_zeros([3, 1]).unwrap();
        assert!(DenseVolume::from_slices(&[slices[0].clone(), odd]).is_err());
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(matches!(
            DenseVolume::from_vec([2, 2, 2], vec![0.0; 7]),
            Err(VolumeError::ShapeMismatch {
                expected: 8,
                actual: 7
            })
        ));
        assert!(matches!(
            DenseVolume::try_zeros([usize::MAX, 2, 2]),
            Err(VolumeError::Allocation { .. })
        ));
    }

    #[test]
    fn slice_operators() {
        let s = DenseSlice::from_vec([2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 300.0]).unwrap();

        let t = s.transpose().unwrap();
        assert_eq!(t.dims(), [3, 2]);
        assert_eq!(t.get(2, 1), 300.0);

        assert_eq!(s.to_u8(), vec![0, 1, 2, 3, 4, 255]);
        assert_eq!(s.min_max(), Some((0.0, 300.0)));

        let mut delta = DenseSlice::try_zeros([3, 3]).unwrap();
        delta.set(1, 1, 1.0);
        assert_eq!(s.convolve2d(&delta).unwrap(), s);

        let flat = DenseSlice::filled([3, 3], 2.0).unwrap();
        assert!((flat.box_blur(3).unwrap().get(1, 1) - 2.0).abs() < 1e-6);
        assert!((flat.unsharp_mask(1.0, 3).unwrap().get(1, 1) - 2.0).abs() < 1e-6);
    }
}
