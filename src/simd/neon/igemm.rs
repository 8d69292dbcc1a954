use std::arch::aarch64::*;
use std::mem;

use crate::simd::params::MinMaxParams;
use crate::simd::tile::{advance_rows, input_rows, output_rows, PTR_SIZE};

const NR: usize = 8;

#[inline]
#[target_feature(enable = "neon")]
unsafe fn mla_lane<const LANE: i32>(acc: float32x4_t, b: float32x4_t, a: float32x2_t) -> float32x4_t {
    vmlaq_lane_f32::<LANE>(acc, b, a)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn fma_lane<const LANE: i32>(acc: float32x4_t, b: float32x4_t, a: float32x2_t) -> float32x4_t {
    vfmaq_lane_f32::<LANE>(acc, b, a)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn mla_dup(acc: float32x4_t, b: float32x4_t, a: float32x4_t) -> float32x4_t {
    vmlaq_f32(acc, b, a)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn fma_dup(acc: float32x4_t, b: float32x4_t, a: float32x4_t) -> float32x4_t {
    vfmaq_f32(acc, b, a)
}

#[inline]
#[target_feature(enable = "neon")]
unsafe fn store_tail(mut c: *mut f32, row: [float32x4_t; 2], nc: usize) {
    let mut v = row[0];
    if nc & 4 != 0 {
        vst1q_f32(c, v);
        v = row[1];
        c = c.add(4);
    }
    let mut half = vget_low_f32(v);
    if nc & 2 != 0 {
        vst1_f32(c, half);
        half = vget_high_f32(v);
        c = c.add(2);
    }
    if nc & 1 != 0 {
        vst1_lane_f32::<0>(c, half);
    }
}

macro_rules! lane_ld64_kernel {
    ($(#[$attr:meta])* $name:ident, $madd_lane:ident, $madd_dup:ident) => {
        $(#[$attr])*
        ///
        /// # Safety
        ///
        /// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
        #[target_feature(enable = "neon")]
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
            let vmin = vld1q_dup_f32(&params.min[0]);
            let vmax = vld1q_dup_f32(&params.max[0]);
            let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

            loop {
                let bias = [vld1q_f32(w), vld1q_f32(w.add(4))];
                w = w.add(NR);
                let mut acc = [bias; MR];

                let mut p = ks;
                loop {
                    let a_rows = input_rows::<MR>(a, zero, a_offset);
                    a = a.add(MR);

                    let mut l = 0;
                    while l + 2 <= k {
                        let mut va = [vdup_n_f32(0.0); MR];
                        for (v, a_row) in va.iter_mut().zip(a_rows.iter()) {
                            *v = vld1_f32(a_row.add(l));
                        }

                        let vb0 = vld1q_f32(w);
                        let vb1 = vld1q_f32(w.add(4));
                        for (acc_row, v) in acc.iter_mut().zip(va.iter()) {
                            acc_row[0] = $madd_lane::<0>(acc_row[0], vb0, *v);
                            acc_row[1] = $madd_lane::<0>(acc_row[1], vb1, *v);
                        }
                        let vb0 = vld1q_f32(w.add(8));
                        let vb1 = vld1q_f32(w.add(12));
                        for (acc_row, v) in acc.iter_mut().zip(va.iter()) {
                            acc_row[0] = $madd_lane::<1>(acc_row[0], vb0, *v);
                            acc_row[1] = $madd_lane::<1>(acc_row[1], vb1, *v);
                        }
                        w = w.add(2 * NR);
                        l += 2;
                    }
                    if l < k {
                        let vb0 = vld1q_f32(w);
                        let vb1 = vld1q_f32(w.add(4));
                        w = w.add(NR);
                        for (acc_row, a_row) in acc.iter_mut().zip(a_rows.iter()) {
                            let va = vld1q_dup_f32(a_row.add(l));
                            acc_row[0] = $madd_dup(acc_row[0], vb0, va);
                            acc_row[1] = $madd_dup(acc_row[1], vb1, va);
                        }
                    }

                    p -= MR * PTR_SIZE;
                    if p == 0 {
                        break;
                    }
                }

                for row in acc.iter_mut() {
                    for v in row.iter_mut() {
                        *v = vminq_f32(vmaxq_f32(*v, vmin), vmax);
                    }
                }

                if nc >= NR {
                    for i in (0..MR).rev() {
                        vst1q_f32(c_rows[i], acc[i][0]);
                        vst1q_f32(c_rows[i].add(4), acc[i][1]);
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

lane_ld64_kernel!(
    /// `MR`x8 NEON kernel.
    igemm_neon_lane_ld64,
    mla_lane,
    mla_dup
);

lane_ld64_kernel!(
    /// `MR`x8 NEON-FMA kernel.
    igemm_neonfma_lane_ld64,
    fma_lane,
    fma_dup
);
