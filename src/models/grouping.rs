use crate::emotion::FaceRegion;

/// 候选框合并的相对容差
pub const GROUP_EPS: f64 = 0.2;

/// 两个框的四条边都在容差之内视为同一目标
fn is_similar(a: &FaceRegion, b: &FaceRegion, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;

    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.x + a.width, b.x + b.width)
        && close(a.y + a.height, b.y + b.height)
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// 等价类划分，返回每个框的类别号和类别总数
fn partition(regions: &[FaceRegion], eps: f64) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..regions.len()).collect();

    for i in 0..regions.len() {
        for j in 0..i {
            if is_similar(&regions[i], &regions[j], eps) {
                let a = find_root(&mut parent, i);
                let b = find_root(&mut parent, j);
                if a != b {
                    parent[a] = b;
                }
            }
        }
    }

    // 类别号按首次出现顺序分配
    let mut class_of_root = vec![usize::MAX; regions.len()];
    let mut labels = Vec::with_capacity(regions.len());
    let mut classes = 0;

    for i in 0..regions.len() {
        let root = find_root(&mut parent, i);
        if class_of_root[root] == usize::MAX {
            class_of_root[root] = classes;
            classes += 1;
        }
        labels.push(class_of_root[root]);
    }

    (labels, classes)
}

/// 合并多尺度检测产生的重叠候选框
///
/// 每个类别取平均框，只保留成员数大于 `min_neighbors` 的类别，
/// 并丢弃被更强的大框包含的小框。`min_neighbors == 0` 时原样返回。
pub fn group_rectangles(candidates: &[FaceRegion], min_neighbors: usize, eps: f64) -> Vec<FaceRegion> {
    if min_neighbors == 0 || candidates.is_empty() {
        return candidates.to_vec();
    }

    let (labels, classes) = partition(candidates, eps);

    let mut sums = vec![[0f64; 4]; classes];
    let mut counts = vec![0usize; classes];

    for (region, &label) in candidates.iter().zip(&labels) {
        let sum = &mut sums[label];
        sum[0] += region.x as f64;
        sum[1] += region.y as f64;
        sum[2] += region.width as f64;
        sum[3] += region.height as f64;
        counts[label] += 1;
    }

    let averaged: Vec<FaceRegion> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &n)| {
            let k = 1.0 / n as f64;
            FaceRegion::new(
                (sum[0] * k).round() as u32,
                (sum[1] * k).round() as u32,
                (sum[2] * k).round() as u32,
                (sum[3] * k).round() as u32,
            )
        })
        .collect();

    let mut grouped = Vec::new();

    for i in 0..classes {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }

        let r1 = averaged[i];
        let swallowed = (0..classes).any(|j| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }

            let r2 = averaged[j];
            let dx = (r2.width as f64 * eps).round() as i64;
            let dy = (r2.height as f64 * eps).round() as i64;
            let (x1, y1, w1, h1) = (r1.x as i64, r1.y as i64, r1.width as i64, r1.height as i64);
            let (x2, y2, w2, h2) = (r2.x as i64, r2.y as i64, r2.width as i64, r2.height as i64);

            x1 >= x2 - dx
                && y1 >= y2 - dy
                && x1 + w1 <= x2 + w2 + dx
                && y1 + h1 <= y2 + h2 + dy
                && (n2 > n1.max(3) || n1 < 3)
        });

        if !swallowed {
            grouped.push(r1);
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(x: u32, y: u32, size: u32, n: usize) -> Vec<FaceRegion> {
        (0..n as u32)
            .map(|i| FaceRegion::new(x + i % 2, y + i % 3, size, size))
            .collect()
    }

    #[test]
    fn test_dense_cluster_becomes_one_region() {
        let regions = cluster(50, 60, 40, 6);
        let grouped = group_rectangles(&regions, 3, GROUP_EPS);

        assert_eq!(grouped.len(), 1);
        let face = grouped[0];
        assert!((50..=51).contains(&face.x));
        assert!((60..=62).contains(&face.y));
        assert_eq!(face.width, 40);
    }

    #[test]
    fn test_sparse_cluster_is_dropped() {
        let mut regions = cluster(50, 60, 40, 3);
        regions.push(FaceRegion::new(300, 300, 24, 24));

        assert!(group_rectangles(&regions, 3, GROUP_EPS).is_empty());
    }

    #[test]
    fn test_zero_neighbors_returns_raw_candidates() {
        let regions = cluster(0, 0, 24, 2);
        assert_eq!(group_rectangles(&regions, 0, GROUP_EPS), regions);
    }

    #[test]
    fn test_small_region_inside_stronger_one_is_removed() {
        let mut regions = vec![FaceRegion::new(100, 100, 100, 100); 5];
        regions.extend(vec![FaceRegion::new(120, 120, 40, 40); 4]);

        let grouped = group_rectangles(&regions, 3, GROUP_EPS);

        assert_eq!(grouped, vec![FaceRegion::new(100, 100, 100, 100)]);
    }

    #[test]
    fn test_separate_faces_keep_detection_order() {
        let mut regions = cluster(10, 10, 30, 4);
        regions.extend(cluster(200, 10, 30, 5));

        let grouped = group_rectangles(&regions, 3, GROUP_EPS);

        assert_eq!(grouped.len(), 2);
        assert!(grouped[0].x < grouped[1].x);
    }
}
