// ============================================================================
// Offload - 分块方案数据模型
// ============================================================================
//
// 文件: src/models/plan.rs
// 职责: 分块边界与行区间的数据结构定义
// 边界:
//   - ✅ 分块边界序列定义
//   - ✅ 分段迭代与序列化
//   - ❌ 不应包含分块算法
//   - ❌ 不应包含任务派发逻辑
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 分块方案：`0 = d0 <= d1 <= ... <= dk = n`
///
/// 相邻边界之间是一个连续分段 `[d_i, d_{i+1})`。均衡分块在代价严重倾斜时
/// 可能产生重复边界（空分段），调用方需要容忍。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionPlan {
    bounds: Vec<usize>,
}

impl PartitionPlan {
    pub(crate) fn from_bounds(bounds: Vec<usize>) -> Self {
        Self { bounds }
    }

    /// 全部边界
    pub fn boundaries(&self) -> &[usize] {
        &self.bounds
    }

    /// 分段数（边界数减一）
    pub fn len(&self) -> usize {
        self.bounds.len().saturating_sub(1)
    }

    /// 是否没有任何分段
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按顺序迭代 `(start, end)` 分段
    pub fn segments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.bounds.windows(2).map(|w| (w[0], w[1]))
    }

    /// 将所有边界平移 `offset`
    pub(crate) fn shifted(self, offset: usize) -> Self {
        Self {
            bounds: self.bounds.into_iter().map(|b| b + offset).collect(),
        }
    }
}

impl fmt::Display for PartitionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.bounds.iter().map(|b| b.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// 行区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 下三角打包存储中该行区间覆盖的元素数
    pub fn tril_cost(&self) -> u64 {
        tri(self.end) - tri(self.start)
    }
}

impl From<(usize, usize)> for RowRange {
    fn from((start, end): (usize, usize)) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// 三角数 `i*(i+1)/2`
pub(crate) fn tri(i: usize) -> u64 {
    let i = i as u64;
    i * (i + 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_follow_boundaries() {
        let plan = PartitionPlan::from_bounds(vec![0, 3, 3, 7]);
        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.segments().collect::<Vec<_>>(),
            vec![(0, 3), (3, 3), (3, 7)]
        );
        assert_eq!(plan.to_string(), "[0, 3, 3, 7]");
    }

    #[test]
    fn single_boundary_is_empty() {
        let plan = PartitionPlan::from_bounds(vec![0]);
        assert!(plan.is_empty());
        assert_eq!(plan.segments().count(), 0);
    }

    #[test]
    fn row_range_tril_cost() {
        assert_eq!(RowRange::new(0, 4).tril_cost(), 10);
        assert_eq!(RowRange::new(4, 6).tril_cost(), 11);
        assert_eq!(serde_json::to_string(&RowRange::new(1, 2)).unwrap(), r#"{"start":1,"end":2}"#);
    }
}
