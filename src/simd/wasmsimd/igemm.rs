//! WebAssembly SIMD128 kernels, 8 columns as two `v128` per row.
//!
//! The `arm` and `x86` flavors differ only in the clamp: `f32x4_max`/`min`
//! lower to NaN-propagating sequences on x86 engines, while the pseudo
//! `pmax`/`pmin` map to single instructions there.

use std::arch::wasm32::*;
use std::mem;

use crate::simd::params::MinMaxParams;
use crate::simd::tile::{advance_rows, input_rows, output_rows, tail_quad, PTR_SIZE};

const NR: usize = 8;

#[inline]
unsafe fn store_tail(mut c: *mut f32, row: [v128; 2], nc: usize) {
    let mut v = row[0];
    if nc & 4 != 0 {
        v128_store(c.cast::<v128>(), v);
        v = row[1];
        c = c.add(4);
    }
    if nc & 2 != 0 {
        c.cast::<u64>().write_unaligned(u64x2_extract_lane::<0>(v));
        v = i64x2_shuffle::<1, 1>(v, v);
        c = c.add(2);
    }
    if nc & 1 != 0 {
        c.write_unaligned(f32x4_extract_lane::<0>(v));
    }
}

#[inline]
fn madd(acc: v128, a: v128, b: v128) -> v128 {
    f32x4_add(acc, f32x4_mul(a, b))
}

#[inline]
unsafe fn load_bias<const MR: usize>(w: *const f32) -> [[v128; 2]; MR] {
    [[v128_load(w.cast::<v128>()), v128_load(w.add(4).cast::<v128>())]; MR]
}

#[inline]
unsafe fn load_b(w: *const f32) -> [v128; 2] {
    [v128_load(w.cast::<v128>()), v128_load(w.add(4).cast::<v128>())]
}

macro_rules! splat_kernel {
    ($(#[$attr:meta])* $name:ident, $max:ident, $min:ident) => {
        $(#[$attr])*
        ///
        /// # Safety
        ///
        /// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
        #[allow(clippy::too_many_arguments)]
        pub unsafe fn $name<const MR: usize>(
            mr: usize,
            mut nc: usize,
            kc: usize,
            ks: usize,
            mut a: *const *const f32,
            mut w: *const f32,
            c: *mut f32,
            cm_stride: usize,
            cn_stride: usize,
            a_offset: usize,
            zero: *const f32,
            params: &MinMaxParams,
        ) {
            debug_assert!(mr != 0 && mr <= MR);
            debug_assert!(ks != 0 && ks % (MR * PTR_SIZE) == 0);
            let k = kc / mem::size_of::<f32>();
            let vmin = v128_load(params.min.as_ptr().cast::<v128>());
            let vmax = v128_load(params.max.as_ptr().cast::<v128>());
            let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

            loop {
                let mut acc = load_bias::<MR>(w);
                w = w.add(NR);

                let mut p = ks;
                loop {
                    let a_rows = input_rows::<MR>(a, zero, a_offset);
                    a = a.add(MR);

                    let mut l = 0;
                    while l + 4 <= k {
                        let mut va = [f32x4_splat(0.0); MR];
                        for (v, a_row) in va.iter_mut().zip(a_rows.iter()) {
                            *v = v128_load(a_row.add(l).cast::<v128>());
                        }
                        for lane in 0..4 {
                            let vb = load_b(w);
                            w = w.add(NR);
                            for (acc_row, v) in acc.iter_mut().zip(va.iter()) {
                                let splat = match lane {
                                    0 => i32x4_shuffle::<0, 0, 0, 0>(*v, *v),
                                    1 => i32x4_shuffle::<1, 1, 1, 1>(*v, *v),
                                    2 => i32x4_shuffle::<2, 2, 2, 2>(*v, *v),
                                    _ => i32x4_shuffle::<3, 3, 3, 3>(*v, *v),
                                };
                                acc_row[0] = madd(acc_row[0], splat, vb[0]);
                                acc_row[1] = madd(acc_row[1], splat, vb[1]);
                            }
                        }
                        l += 4;
                    }
                    while l < k {
                        let vb = load_b(w);
                        w = w.add(NR);
                        for (acc_row, a_row) in acc.iter_mut().zip(a_rows.iter()) {
                            let va = v128_load32_splat(a_row.add(l).cast::<u32>());
                            acc_row[0] = madd(acc_row[0], va, vb[0]);
                            acc_row[1] = madd(acc_row[1], va, vb[1]);
                        }
                        l += 1;
                    }

                    p -= MR * PTR_SIZE;
                    if p == 0 {
                        break;
                    }
                }

                for row in acc.iter_mut() {
                    for v in row.iter_mut() {
                        *v = $max(vmin, *v);
                        *v = $min(vmax, *v);
                    }
                }

                if nc >= NR {
                    for i in (0..MR).rev() {
                        v128_store(c_rows[i].cast::<v128>(), acc[i][0]);
                        v128_store(c_rows[i].add(4).cast::<v128>(), acc[i][1]);
                    }
                    advance_rows(&mut c_rows, cn_stride);
                    a = a.sub(ks / PTR_SIZE);
                    nc -= NR;
                } else {
                    for i in (0..MR).rev() {
                        store_tail(c_rows[i], acc[i], nc);
                    }
                    nc = 0;
                }
                if nc == 0 {
                    break;
                }
            }
        }
    };
}

splat_kernel!(
    /// `MR`x8 splat kernel clamped with IEEE `min`/`max`.
    igemm_wasmsimd_arm_splat,
    f32x4_max,
    f32x4_min
);

splat_kernel!(
    /// `MR`x8 splat kernel clamped with pseudo-min/max.
    igemm_wasmsimd_x86_splat,
    f32x4_pmax,
    f32x4_pmin
);

/// `MR`x8 kernel over weights packed with `sr = 4`; the `A` quad rotates by
/// one lane after every reduction step.
///
/// # Safety
///
/// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
#[allow(clippy::too_many_arguments)]
pub unsafe fn igemm_wasmsimd_arm_s4<const MR: usize>(
    mr: usize,
    mut nc: usize,
    kc: usize,
    ks: usize,
    mut a: *const *const f32,
    mut w: *const f32,
    c: *mut f32,
    cm_stride: usize,
    cn_stride: usize,
    a_offset: usize,
    zero: *const f32,
    params: &MinMaxParams,
) {
    debug_assert!(mr != 0 && mr <= MR);
    debug_assert!(ks != 0 && ks % (MR * PTR_SIZE) == 0);
    let k = kc / mem::size_of::<f32>();
    let vmin = v128_load(params.min.as_ptr().cast::<v128>());
    let vmax = v128_load(params.max.as_ptr().cast::<v128>());
    let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

    loop {
        let mut acc = load_bias::<MR>(w);
        w = w.add(NR);

        let mut p = ks;
        loop {
            let a_rows = input_rows::<MR>(a, zero, a_offset);
            a = a.add(MR);

            let mut l = 0;
            while l < k {
                let mut va = [f32x4_splat(0.0); MR];
                for (v, a_row) in va.iter_mut().zip(a_rows.iter()) {
                    *v = if l + 4 <= k {
                        v128_load(a_row.add(l).cast::<v128>())
                    } else {
                        let quad = tail_quad(a_row.add(l), k - l);
                        v128_load(quad.as_ptr().cast::<v128>())
                    };
                }
                for _ in 0..4 {
                    let vb = load_b(w);
                    w = w.add(NR);
                    for (acc_row, v) in acc.iter_mut().zip(va.iter_mut()) {
                        acc_row[0] = madd(acc_row[0], *v, vb[0]);
                        acc_row[1] = madd(acc_row[1], *v, vb[1]);
                        *v = i32x4_shuffle::<1, 2, 3, 0>(*v, *v);
                    }
                }
                l += 4;
            }

            p -= MR * PTR_SIZE;
            if p == 0 {
                break;
            }
        }

        for row in acc.iter_mut() {
            for v in row.iter_mut() {
                *v = f32x4_min(f32x4_max(*v, vmin), vmax);
            }
        }

        if nc >= NR {
            for i in (0..MR).rev() {
                v128_store(c_rows[i].cast::<v128>(), acc[i][0]);
                v128_store(c_rows[i].add(4).cast::<v128>(), acc[i][1]);
            }
            advance_rows(&mut c_rows, cn_stride);
            a = a.sub(ks / PTR_SIZE);
            nc -= NR;
        } else {
            for i in (0..MR).rev() {
                store_tail(c_rows[i], acc[i], nc);
            }
            nc = 0;
        }
        if nc == 0 {
            break;
        }
    }
}
