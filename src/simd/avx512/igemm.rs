//! AVX-512F broadcast kernels, one 16-lane `__m512` per row.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
use std::mem;

use crate::simd::params::MinMaxParams;
use crate::simd::tile::{advance_rows, input_rows, output_rows, PTR_SIZE};

const NR: usize = 16;

/// `MR`x16 kernel. Partial column blocks use a masked store.
///
/// # Safety
///
/// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
#[target_feature(enable = "avx512f")]
#[allow(clippy::too_many_arguments)]
pub unsafe fn igemm_avx512f_broadcast<const MR: usize>(
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
    let vmin = _mm512_load_ps(params.min.as_ptr());
    let vmax = _mm512_load_ps(params.max.as_ptr());
    let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

    loop {
        let mut acc = [_mm512_loadu_ps(w); MR];
        w = w.add(NR);

        let mut p = ks;
        loop {
            let a_rows = input_rows::<MR>(a, zero, a_offset);
            a = a.add(MR);

            for l in 0..k {
                let vb = _mm512_loadu_ps(w);
                w = w.add(NR);
                for (acc_row, a_row) in acc.iter_mut().zip(a_rows.iter()) {
                    let va = _mm512_set1_ps(*a_row.add(l));
                    *acc_row = _mm512_fmadd_ps(va, vb, *acc_row);
                }
            }

            p -= MR * PTR_SIZE;
            if p == 0 {
                break;
            }
        }

        for v in acc.iter_mut() {
            *v = _mm512_min_ps(_mm512_max_ps(*v, vmin), vmax);
        }

        if nc >= NR {
            for i in (0..MR).rev() {
                _mm512_storeu_ps(c_rows[i], acc[i]);
            }
            advance_rows(&mut c_rows, cn_stride);
            a = a.sub(ks / PTR_SIZE);
            nc -= NR;
        } else {
            let mask: __mmask16 = ((1u32 << nc) - 1) as __mmask16;
            for i in (0..MR).rev() {
                _mm512_mask_storeu_ps(c_rows[i], mask, acc[i]);
            }
            nc = 0;
        }
        if nc == 0 {
            break;
        }
    }
}
