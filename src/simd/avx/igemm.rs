//! AVX and FMA3 broadcast kernels.
//!
//! A tile row is `NV` 8-lane `__m256` vectors (`NR = 8 * NV`). Each `A`
//! element is broadcast once and multiplied against all `NV` weight vectors.
//! The AVX and FMA3 variants share one body and differ only in the
//! multiply-add.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
use std::mem;

use crate::simd::params::MinMaxParams;
use crate::simd::tile::{advance_rows, input_rows, output_rows, PTR_SIZE};

#[inline]
#[target_feature(enable = "avx")]
unsafe fn madd_avx(acc: __m256, a: __m256, b: __m256) -> __m256 {
    _mm256_add_ps(acc, _mm256_mul_ps(a, b))
}

#[inline]
#[target_feature(enable = "avx,fma")]
unsafe fn madd_fma3(acc: __m256, a: __m256, b: __m256) -> __m256 {
    _mm256_fmadd_ps(a, b, acc)
}

/// Stores the first `nc < 8 * NV` columns of one row.
#[inline]
#[target_feature(enable = "avx")]
unsafe fn store_tail<const NV: usize>(mut c: *mut f32, row: &[__m256; NV], mut nc: usize) {
    let mut v = 0;
    while nc >= 8 {
        _mm256_storeu_ps(c, row[v]);
        c = c.add(8);
        v += 1;
        nc -= 8;
    }
    if nc == 0 {
        return;
    }

    let mut lo = _mm256_castps256_ps128(row[v]);
    if nc & 4 != 0 {
        _mm_storeu_ps(c, lo);
        lo = _mm256_extractf128_ps::<1>(row[v]);
        c = c.add(4);
    }
    if nc & 2 != 0 {
        _mm_storel_epi64(c.cast::<__m128i>(), _mm_castps_si128(lo));
        lo = _mm_movehl_ps(lo, lo);
        c = c.add(2);
    }
    if nc & 1 != 0 {
        _mm_store_ss(c, lo);
    }
}

macro_rules! broadcast_kernel {
    ($(#[$attr:meta])* $name:ident, $feature:literal, $madd:ident) => {
        $(#[$attr])*
        ///
        /// # Safety
        ///
        /// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
        #[target_feature(enable = $feature)]
        #[allow(clippy::too_many_arguments)]
        pub unsafe fn $name<const MR: usize, const NV: usize>(
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
            let nr = 8 * NV;
            let k = kc / mem::size_of::<f32>();
            let vmin = _mm256_load_ps(params.min.as_ptr());
            let vmax = _mm256_load_ps(params.max.as_ptr());
            let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

            loop {
                let mut bias = [_mm256_setzero_ps(); NV];
                for (v, b) in bias.iter_mut().enumerate() {
                    *b = _mm256_loadu_ps(w.add(8 * v));
                }
                w = w.add(nr);
                let mut acc = [bias; MR];

                let mut p = ks;
                loop {
                    let a_rows = input_rows::<MR>(a, zero, a_offset);
                    a = a.add(MR);

                    for l in 0..k {
                        let mut vb = [_mm256_setzero_ps(); NV];
                        for (v, b) in vb.iter_mut().enumerate() {
                            *b = _mm256_loadu_ps(w.add(8 * v));
                        }
                        w = w.add(nr);
                        for (acc_row, a_row) in acc.iter_mut().zip(a_rows.iter()) {
                            let va = _mm256_broadcast_ss(&*a_row.add(l));
                            for (acc_v, b) in acc_row.iter_mut().zip(vb.iter()) {
                                *acc_v = $madd(*acc_v, va, *b);
                            }
                        }
                    }

                    p -= MR * PTR_SIZE;
                    if p == 0 {
                        break;
                    }
                }

                for row in acc.iter_mut() {
                    for v in row.iter_mut() {
                        *v = _mm256_min_ps(_mm256_max_ps(*v, vmin), vmax);
                    }
                }

                if nc >= nr {
                    for i in (0..MR).rev() {
                        for v in 0..NV {
                            _mm256_storeu_ps(c_rows[i].add(8 * v), acc[i][v]);
                        }
                    }
                    advance_rows(&mut c_rows, cn_stride);
                    a = a.sub(ks / PTR_SIZE);
                    nc -= nr;
                } else {
                    for i in (0..MR).rev() {
                        store_tail(c_rows[i], &acc[i], nc);
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

broadcast_kernel!(
    /// `MR`x`8·NV` AVX kernel, separate multiply and add.
    igemm_avx_broadcast,
    "avx",
    madd_avx
);

broadcast_kernel!(
    /// `MR`x`8·NV` FMA3 kernel.
    igemm_fma3_broadcast,
    "avx,fma",
    madd_fma3
);
