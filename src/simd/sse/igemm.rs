//! SSE IGEMM kernels with an 8-column tile held as two `__m128` per row.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;
use std::mem;

use crate::simd::params::MinMaxParams;
use crate::simd::tile::{advance_rows, input_rows, output_rows, tail_quad, PTR_SIZE};

const NR: usize = 8;

/// Stores the first `nc < 8` columns of one row.
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn store_tail(mut c: *mut f32, row: [__m128; 2], nc: usize) {
    let mut v = row[0];
    if nc & 4 != 0 {
        _mm_storeu_ps(c, v);
        v = row[1];
        c = c.add(4);
    }
    if nc & 2 != 0 {
        _mm_storel_epi64(c.cast::<__m128i>(), _mm_castps_si128(v));
        v = _mm_movehl_ps(v, v);
        c = c.add(2);
    }
    if nc & 1 != 0 {
        _mm_store_ss(c, v);
    }
}

/// Clamps the tile and stores it, last row first. Returns `true` when a
/// full column block was written.
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn clamp_and_store<const MR: usize>(
    acc: &mut [[__m128; 2]; MR],
    c_rows: &[*mut f32; MR],
    nc: usize,
    params: &MinMaxParams,
) -> bool {
    let vmin = _mm_load_ps(params.min.as_ptr());
    let vmax = _mm_load_ps(params.max.as_ptr());
    for row in acc.iter_mut() {
        for v in row.iter_mut() {
            *v = _mm_min_ps(_mm_max_ps(*v, vmin), vmax);
        }
    }

    if nc >= NR {
        for i in (0..MR).rev() {
            _mm_storeu_ps(c_rows[i], acc[i][0]);
            _mm_storeu_ps(c_rows[i].add(4), acc[i][1]);
        }
        true
    } else {
        for i in (0..MR).rev() {
            store_tail(c_rows[i], acc[i], nc);
        }
        false
    }
}

/// `MR`x8 kernel, one broadcast load per `A` element.
///
/// # Safety
///
/// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
#[target_feature(enable = "sse2")]
#[allow(clippy::too_many_arguments)]
pub unsafe fn igemm_sse_load1<const MR: usize>(
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
    let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

    loop {
        let bias = [_mm_loadu_ps(w), _mm_loadu_ps(w.add(4))];
        w = w.add(NR);
        let mut acc = [bias; MR];

        let mut p = ks;
        loop {
            let a_rows = input_rows::<MR>(a, zero, a_offset);
            a = a.add(MR);

            for l in 0..k {
                let vb0 = _mm_loadu_ps(w);
                let vb1 = _mm_loadu_ps(w.add(4));
                w = w.add(NR);
                for (acc_row, a_row) in acc.iter_mut().zip(a_rows.iter()) {
                    let va = _mm_load1_ps(a_row.add(l));
                    acc_row[0] = _mm_add_ps(acc_row[0], _mm_mul_ps(va, vb0));
                    acc_row[1] = _mm_add_ps(acc_row[1], _mm_mul_ps(va, vb1));
                }
            }

            p -= MR * PTR_SIZE;
            if p == 0 {
                break;
            }
        }

        if clamp_and_store(&mut acc, &c_rows, nc, params) {
            advance_rows(&mut c_rows, cn_stride);
            a = a.sub(ks / PTR_SIZE);
            nc -= NR;
        } else {
            nc = 0;
        }
        if nc == 0 {
            break;
        }
    }
}

/// One group of four reduction steps in the `s4` layout: `va` is rotated by
/// one lane after every step. Returns the advanced weight pointer.
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn s4_group<const MR: usize>(
    acc: &mut [[__m128; 2]; MR],
    mut va: [__m128; MR],
    mut w: *const f32,
) -> *const f32 {
    for _ in 0..4 {
        let vb0 = _mm_loadu_ps(w);
        let vb1 = _mm_loadu_ps(w.add(4));
        w = w.add(NR);
        for (acc_row, v) in acc.iter_mut().zip(va.iter_mut()) {
            acc_row[0] = _mm_add_ps(acc_row[0], _mm_mul_ps(*v, vb0));
            acc_row[1] = _mm_add_ps(acc_row[1], _mm_mul_ps(*v, vb1));
            *v = _mm_shuffle_ps::<0x39>(*v, *v);
        }
    }
    w
}

/// `MR`x8 kernel over weights packed with `sr = 4`.
///
/// # Safety
///
/// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
#[target_feature(enable = "sse2")]
#[allow(clippy::too_many_arguments)]
pub unsafe fn igemm_sse_s4<const MR: usize>(
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
    let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

    loop {
        let bias = [_mm_loadu_ps(w), _mm_loadu_ps(w.add(4))];
        w = w.add(NR);
        let mut acc = [bias; MR];

        let mut p = ks;
        loop {
            let a_rows = input_rows::<MR>(a, zero, a_offset);
            a = a.add(MR);

            let mut l = 0;
            while l + 4 <= k {
                let mut va = [_mm_setzero_ps(); MR];
                for (v, a_row) in va.iter_mut().zip(a_rows.iter()) {
                    *v = _mm_loadu_ps(a_row.add(l));
                }
                w = s4_group(&mut acc, va, w);
                l += 4;
            }
            if l < k {
                let mut va = [_mm_setzero_ps(); MR];
                for (v, a_row) in va.iter_mut().zip(a_rows.iter()) {
                    let quad = tail_quad(a_row.add(l), k - l);
                    *v = _mm_loadu_ps(quad.as_ptr());
                }
                w = s4_group(&mut acc, va, w);
            }

            p -= MR * PTR_SIZE;
            if p == 0 {
                break;
            }
        }

        if clamp_and_store(&mut acc, &c_rows, nc, params) {
            advance_rows(&mut c_rows, cn_stride);
            a = a.sub(ks / PTR_SIZE);
            nc -= NR;
        } else {
            nc = 0;
        }
        if nc == 0 {
            break;
        }
    }
}
