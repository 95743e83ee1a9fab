use crate::{common::*, Label, BACKGROUND, IGNORE};

/// A ground-truth object instance found in an instance grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLabel {
    pub id: i32,
    pub label: Label<TLBR<i64>, i32>,
}

/// Extracts the instances of an instance grid along with their classes and bounding boxes.
///
/// Pixels with a negative instance id, or whose class is ignored or background,
/// do not belong to any instance. An instance takes the class of its first pixel
/// in row-major order. The result is sorted by instance id.
pub fn instance_labels(
    instance_map: ArrayView2<i32>,
    class_map: ArrayView2<i32>,
) -> Result<Vec<InstanceLabel>> {
    crate::ensure_same_shape(instance_map, class_map)?;

    let mut extents: BTreeMap<i32, ([i64; 4], i32)> = BTreeMap::new();

    for ((y, x), &id) in instance_map.indexed_iter() {
        let class = class_map[[y, x]];
        if id < 0 || class == IGNORE || class == BACKGROUND {
            continue;
        }

        let (y, x) = (y as i64, x as i64);
        let ([t, l, b, r], _) = extents
            .entry(id)
            .or_insert(([y, x, y + 1, x + 1], class));
        *t = (*t).min(y);
        *l = (*l).min(x);
        *b = (*b).max(y + 1);
        *r = (*r).max(x + 1);
    }

    extents
        .into_iter()
        .map(|(id, (tlbr, class))| {
            Ok(InstanceLabel {
                id,
                label: Label {
                    rect: TLBR::try_from_tlbr(tlbr)?,
                    class,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_instances() -> Result<()> {
        let mut instance_map = Array2::from_elem((10, 12), IGNORE);
        let mut class_map = Array2::from_elem((10, 12), BACKGROUND);

        instance_map.slice_mut(s![2..5, 3..7]).fill(4);
        class_map.slice_mut(s![2..5, 3..7]).fill(2);
        instance_map.slice_mut(s![6..9, 0..2]).fill(1);
        class_map.slice_mut(s![6..9, 0..2]).fill(3);

        // instance pixels marked as ignored do not count
        instance_map[[9, 11]] = 4;
        class_map[[9, 11]] = IGNORE;

        let instances = instance_labels(instance_map.view(), class_map.view())?;
        assert_eq!(instances.len(), 2);

        assert_eq!(instances[0].id, 1);
        assert_eq!(instances[0].label.class, 3);
        assert_eq!(instances[0].label.rect.tlbr(), [6, 0, 9, 2]);

        assert_eq!(instances[1].id, 4);
        assert_eq!(instances[1].label.class, 2);
        assert_eq!(instances[1].label.rect.tlbr(), [2, 3, 5, 7]);
        Ok(())
    }

    #[test]
    fn mismatched_shapes_fail() {
        let instance_map = Array2::from_elem((3, 3), IGNORE);
        let class_map = Array2::from_elem((3, 4), BACKGROUND);
        assert!(instance_labels(instance_map.view(), class_map.view()).is_err());
    }
}
