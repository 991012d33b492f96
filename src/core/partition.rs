// ============================================================================
// Offload - 代价均衡分块
// ============================================================================
//
// 文件: src/core/partition.rs
// 职责: 基于累积代价序列的分块边界计算
// 边界:
//   - ✅ 按任务数均衡分块
//   - ✅ 按块大小贪心分块
//   - ✅ 下三角行区间分块
//   - ✅ 定步长分块与下三角索引矩阵
//   - ❌ 不包含任务派发逻辑
//   - ❌ 不包含任何共享状态或 I/O
//
// ============================================================================

use crate::error::{OffloadError, Result};
use crate::models::plan::{tri, PartitionPlan, RowRange};

/// 可作为累积代价的数值类型
pub trait Cost: Copy {
    fn to_f64(self) -> f64;
}

macro_rules! impl_cost {
    ($($ty:ty),*) => {
        $(impl Cost for $ty {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }
        })*
    };
}

impl_cost!(u32, u64, usize, i32, i64, f32, f64);

/// 校验累积代价序列：非空且单调不减
fn validate<T: Cost>(cum: &[T]) -> Result<Vec<f64>> {
    if cum.is_empty() {
        return Err(OffloadError::invalid("cost sequence is empty"));
    }
    let values: Vec<f64> = cum.iter().map(|c| c.to_f64()).collect();
    if let Some(i) = values.windows(2).position(|w| !(w[0] <= w[1])) {
        return Err(OffloadError::invalid(format!(
            "cost sequence decreases at index {}",
            i + 1
        )));
    }
    Ok(values)
}

/// 按任务数均衡分块
///
/// 总代价 `cum[n]` 被切成 `ntasks` 个等宽代价带，每个带边界取累积代价最接近的下标。
/// 距离相等时取下标较小者（顺序扫描遇到的第一个最小值）。首尾边界固定为 `0` 和 `n`，
/// 因此尾部零代价项不会让最后一个边界落在 `n` 之前。
pub fn balanced_partition<T: Cost>(cum: &[T], ntasks: usize) -> Result<PartitionPlan> {
    if ntasks == 0 {
        return Err(OffloadError::invalid("ntasks must be positive"));
    }
    let values = validate(cum)?;
    let n = values.len() - 1;
    let segsize = values[n] / ntasks as f64;

    let mut bounds = Vec::with_capacity(ntasks + 1);
    bounds.push(0);
    for k in 1..ntasks {
        bounds.push(nearest_index(&values, k as f64 * segsize));
    }
    bounds.push(n);

    Ok(PartitionPlan::from_bounds(bounds))
}

/// 单调序列中与 `target` 最接近的第一个下标
fn nearest_index(values: &[f64], target: f64) -> usize {
    let above = values.partition_point(|&v| v < target);
    if above == 0 {
        return 0;
    }

    // 相同取值的第一个下标
    let below_value = values[above - 1];
    let below = values.partition_point(|&v| v < below_value);
    if above == values.len() {
        return below;
    }

    if values[above] - target < target - below_value {
        above
    } else {
        below
    }
}

/// 按块大小贪心分块
///
/// 从左到右扫描，当 `cum[i+1] - cum[last]` 严格大于 `blocksize` 时在 `i` 处开启新分段。
/// 已放置的边界不会回退，因此只有单个代价超过 `blocksize` 的项会使分段超限。
pub fn blocksize_partition<T: Cost>(cum: &[T], blocksize: f64) -> Result<PartitionPlan> {
    if !(blocksize > 0.0) {
        return Err(OffloadError::invalid(format!(
            "blocksize must be positive, got {}",
            blocksize
        )));
    }
    let values = validate(cum)?;
    Ok(greedy_bounds(&values, blocksize))
}

fn greedy_bounds(values: &[f64], blocksize: f64) -> PartitionPlan {
    let n = values.len() - 1;
    let mut bounds = vec![0];
    if n == 0 {
        return PartitionPlan::from_bounds(bounds);
    }

    let mut last = 0;
    for i in 1..n {
        if values[i + 1] - values[last] > blocksize {
            bounds.push(i);
            last = i;
        }
    }
    bounds.push(n);

    PartitionPlan::from_bounds(bounds)
}

/// 下三角行区间分块
///
/// 行 `i` 的代价为 `i+1`（打包下三角存储），累积代价取三角数并以 `start` 为零点。
/// 返回的区间首尾相接覆盖 `[start, stop)`；`start >= stop` 时返回空列表。
pub fn triangular_range_partition(
    start: usize,
    stop: usize,
    blocksize: f64,
) -> Result<Vec<RowRange>> {
    if start >= stop {
        return Ok(Vec::new());
    }
    let base = tri(start);
    let cum: Vec<u64> = (start..=stop).map(|i| tri(i) - base).collect();
    let plan = blocksize_partition(&cum, blocksize)?.shifted(start);

    Ok(plan.segments().map(RowRange::from).collect())
}

/// 定步长分块，最后一段截断到 `stop`
pub fn prange(start: usize, stop: usize, step: usize) -> Result<Vec<RowRange>> {
    if step == 0 {
        return Err(OffloadError::invalid("step must be positive"));
    }
    Ok((start..stop)
        .step_by(step)
        .map(|i| RowRange::new(i, (i + step).min(stop)))
        .collect())
}

/// `n×n` 对称矩阵，元素为其在下三角打包向量中的下标
///
/// ```text
/// [0 1 3 ...]
/// [1 2 4 ...]
/// [3 4 5 ...]
/// ```
pub fn square_mat_in_trilu_indices(n: usize) -> Vec<Vec<usize>> {
    let mut mat = vec![vec![0; n]; n];
    let mut k = 0;
    for i in 0..n {
        for j in 0..=i {
            mat[i][j] = k;
            mat[j][i] = k;
            k += 1;
        }
    }
    mat
}
