//! Portable kernels, one generic body for every `{MR, NR, KR, SR}` tile.
//!
//! The scalar kernel walks the packed weights in storage order and maps each
//! packed lane back to its logical reduction index, so the same body serves
//! the plain (`KR = SR = 1`), grouped (`c4`) and shuffled (`s4`) layouts.

use std::mem;

use crate::isa::Isa;
use crate::simd::params::{init_scalar_params, MinMaxParams};
use crate::simd::tile::{advance_rows, input_rows, output_rows, PTR_SIZE};
use crate::simd::IgemmMicrokernel;
use crate::utils::{round_down_po2, round_up};

/// Generic scalar IGEMM minmax kernel.
///
/// # Safety
///
/// See [`IgemmMinmaxUkernelFn`](crate::simd::IgemmMinmaxUkernelFn).
#[allow(clippy::too_many_arguments)]
pub unsafe fn igemm_scalar<const MR: usize, const NR: usize, const KR: usize, const SR: usize>(
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
    debug_assert!(nc != 0);
    debug_assert!(kc != 0 && kc % mem::size_of::<f32>() == 0);
    debug_assert!(ks != 0 && ks % (MR * PTR_SIZE) == 0);

    let k = kc / mem::size_of::<f32>();
    let skr = KR * SR;
    let packed_k = round_up(k, skr);
    let (vmin, vmax) = (params.min[0], params.max[0]);

    let mut c_rows = output_rows::<MR>(c, mr, cm_stride);

    loop {
        let mut acc = [[0.0f32; NR]; MR];
        for row in acc.iter_mut() {
            for (j, value) in row.iter_mut().enumerate() {
                *value = *w.add(j);
            }
        }
        w = w.add(NR);

        let mut p = ks;
        loop {
            let a_rows = input_rows::<MR>(a, zero, a_offset);
            a = a.add(MR);

            let mut kb = 0;
            while kb < packed_k {
                let base = round_down_po2(kb, skr);
                for j in 0..NR {
                    for t in 0..KR {
                        let idx = base + ((kb + t + j * KR) & (skr - 1));
                        let b = *w.add(j * KR + t);
                        if idx < k {
                            for (acc_row, a_row) in acc.iter_mut().zip(a_rows.iter()) {
                                acc_row[j] += *a_row.add(idx) * b;
                            }
                        }
                    }
                }
                w = w.add(NR * KR);
                kb += KR;
            }

            p -= MR * PTR_SIZE;
            if p == 0 {
                break;
            }
        }

        for row in acc.iter_mut() {
            for value in row.iter_mut() {
                *value = value.max(vmin).min(vmax);
            }
        }

        if nc >= NR {
            for i in (0..MR).rev() {
                std::ptr::copy_nonoverlapping(acc[i].as_ptr(), c_rows[i], NR);
            }
            advance_rows(&mut c_rows, cn_stride);
            a = a.sub(ks / PTR_SIZE);
            nc -= NR;
        } else {
            for i in (0..MR).rev() {
                std::ptr::copy_nonoverlapping(acc[i].as_ptr(), c_rows[i], nc);
            }
            nc = 0;
        }

        if nc == 0 {
            break;
        }
    }
}

macro_rules! scalar_microkernel {
    ($name:literal, $mr:literal, $nr:literal, $kr:literal, $sr:literal) => {
        IgemmMicrokernel {
            name: $name,
            isa: Isa::Scalar,
            mr: $mr,
            nr: $nr,
            kr: $kr,
            sr: $sr,
            ukernel: igemm_scalar::<$mr, $nr, $kr, $sr>,
            init_params: init_scalar_params,
        }
    };
}

pub const MICROKERNELS: &[IgemmMicrokernel] = &[
    scalar_microkernel!("f32_igemm_minmax_ukernel_1x4__scalar", 1, 4, 1, 1),
    scalar_microkernel!("f32_igemm_minmax_ukernel_2x4__scalar", 2, 4, 1, 1),
    scalar_microkernel!("f32_igemm_minmax_ukernel_4x2__scalar", 4, 2, 1, 1),
    scalar_microkernel!("f32_igemm_minmax_ukernel_4x4__scalar", 4, 4, 1, 1),
    scalar_microkernel!("f32_igemm_minmax_ukernel_4x2c4__scalar", 4, 2, 4, 1),
    scalar_microkernel!("f32_igemm_minmax_ukernel_4x4s4__scalar", 4, 4, 1, 4),
];
