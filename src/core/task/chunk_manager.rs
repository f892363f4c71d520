use serde::{Deserialize, Serialize};

/// 下载分段：资源中 `[start, end)` 的一段连续字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub start: u64,
    /// 不包含
    pub end: u64,
    pub finished: u64,
}

impl Segment {
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self { index, start, end, finished: 0 }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn remaining(&self) -> u64 {
        self.len().saturating_sub(self.finished)
    }

    pub fn is_completed(&self) -> bool {
        self.finished >= self.len()
    }

    /// 下一个待写入的绝对偏移
    pub fn offset(&self) -> u64 {
        self.start + self.finished
    }
}

/// 把 `[0, length)` 切分为连续、不重叠的分段
///
/// 不支持 Range 的资源固定为 1 段；分段数不会超过字节数，避免出现空段。
pub fn partition(length: u64, thread_count: usize, supports_range: bool) -> Vec<Segment> {
    let count = if supports_range { thread_count.max(1) as u64 } else { 1 };
    let count = count.min(length.max(1));
    let average = length / count;

    (0..count)
        .map(|i| {
            let start = i * average;
            let end = if i == count - 1 { length } else { start + average };
            Segment::new(i as usize, start, end)
        })
        .collect()
}

/// 分段是否按序、连续、完整地覆盖 `[0, length)`
pub fn is_valid_partition(segments: &[Segment], length: u64) -> bool {
    if segments.is_empty() {
        return false;
    }
    let mut expected_start = 0;
    for (i, segment) in segments.iter().enumerate() {
        if segment.index != i
            || segment.start != expected_start
            || segment.end < segment.start
            || segment.finished > segment.len()
        {
            return false;
        }
        expected_start = segment.end;
    }
    expected_start == length
}

/// 由持久化分段计算出的只读进度视图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub finished: u64,
    pub length: u64,
    pub percent: u8,
}

impl DownloadInfo {
    pub fn from_segments(segments: &[Segment]) -> Option<Self> {
        if segments.is_empty() {
            return None;
        }
        let finished = segments.iter().map(|s| s.finished.min(s.len())).sum();
        let length = segments.iter().map(Segment::len).sum();
        Some(Self { finished, length, percent: percent(finished, length) })
    }
}

pub fn percent(finished: u64, length: u64) -> u8 {
    if length == 0 {
        return 0;
    }
    (finished.min(length) as u128 * 100 / length as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_scenario() {
        let segments = partition(10_000, 4, true);
        let ranges: Vec<(u64, u64)> = segments.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 2500), (2500, 5000), (5000, 7500), (7500, 10_000)]);
        assert!(segments.iter().all(|s| s.finished == 0));
    }

    #[test]
    fn test_partition_without_range_support() {
        for count in [1, 3, 8, 32] {
            let segments = partition(12_345, count, false);
            assert_eq!(segments, vec![Segment::new(0, 0, 12_345)]);
        }
    }

    #[test]
    fn test_partition_covers_length() {
        for length in [1u64, 2, 3, 7, 999, 1000, 1001, 65_537, 10_000_019] {
            for count in 1..=12 {
                let segments = partition(length, count, true);
                assert!(is_valid_partition(&segments, length), "length={} count={}", length, count);
                assert!(segments.iter().all(|s| !s.is_empty()));
                assert_eq!(segments.iter().map(Segment::len).sum::<u64>(), length);
            }
        }
    }

    #[test]
    fn test_invalid_partitions() {
        let mut segments = partition(100, 4, true);
        assert!(!is_valid_partition(&segments, 101));

        segments.remove(1);
        assert!(!is_valid_partition(&segments, 100));

        let mut over = partition(100, 2, true);
        over[0].finished = 51;
        assert!(!is_valid_partition(&over, 100));

        assert!(!is_valid_partition(&[], 0));
    }

    #[test]
    fn test_segment_offsets() {
        let mut segment = Segment::new(1, 2500, 5000);
        segment.finished = 1000;
        assert_eq!(segment.offset(), 3500);
        assert_eq!(segment.remaining(), 1500);
        assert!(!segment.is_completed());
        segment.finished = 2500;
        assert!(segment.is_completed());
    }

    #[test]
    fn test_download_info() {
        assert_eq!(DownloadInfo::from_segments(&[]), None);

        let mut segments = partition(10_000, 4, true);
        segments[0].finished = 2500;
        segments[1].finished = 1000;
        let info = DownloadInfo::from_segments(&segments).unwrap();
        assert_eq!(info, DownloadInfo { finished: 3500, length: 10_000, percent: 35 });
    }
}
