//! Sorting and searching over the hazard pointers collected by a scan.

/// Sorts `slice` in place in ascending order.
///
/// Not stable, O(n log n) and allocation free.
#[inline]
pub fn heap_sort<T: Ord>(slice: &mut [T]) {
    let len = slice.len();
    if len < 2 {
        return;
    }

    for start in (0..len / 2).rev() {
        sift_down(slice, start, len);
    }

    for end in (1..len).rev() {
        slice.swap(0, end);
        sift_down(slice, 0, end);
    }
}

/// Moves all duplicates of a **sorted** slice to its end and returns the
/// number of unique elements, which remain at the front in sorted order.
#[inline]
pub fn remove_duplicates<T: Ord>(slice: &mut [T]) -> usize {
    if slice.is_empty() {
        return 0;
    }

    let mut unique = 1;
    for curr in 1..slice.len() {
        if slice[curr] != slice[unique - 1] {
            slice.swap(unique, curr);
            unique += 1;
        }
    }

    unique
}

/// Returns `true` if `elem` is contained in the sorted and duplicate-free
/// `slice`.
#[inline]
pub fn binary_search<T: Ord>(slice: &[T], elem: &T) -> bool {
    let (mut low, mut high) = (0, slice.len());
    while low < high {
        let mid = low + (high - low) / 2;
        match slice[mid].cmp(elem) {
            core::cmp::Ordering::Less => low = mid + 1,
            core::cmp::Ordering::Greater => high = mid,
            core::cmp::Ordering::Equal => return true,
        }
    }

    false
}

#[inline]
fn sift_down<T: Ord>(slice: &mut [T], mut root: usize, end: usize) {
    loop {
        let mut child = 2 * root + 1;
        if child >= end {
            return;
        }

        if child + 1 < end && slice[child] < slice[child + 1] {
            child += 1;
        }

        if slice[root] >= slice[child] {
            return;
        }

        slice.swap(root, child);
        root = child;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::pointer::GlobalPtr;

    #[test]
    fn sort_global_pointers() {
        let mut ptrs = vec![
            GlobalPtr::<u64>::new(1, 4),
            GlobalPtr::new(0, 9),
            GlobalPtr::new(1, 0),
            GlobalPtr::new(0, 9),
            GlobalPtr::new(0, 2),
        ];

        heap_sort(&mut ptrs);
        let len = remove_duplicates(&mut ptrs);
        assert_eq!(len, 4);
        assert_eq!(
            &ptrs[..len],
            &[
                GlobalPtr::new(0, 2),
                GlobalPtr::new(0, 9),
                GlobalPtr::new(1, 0),
                GlobalPtr::new(1, 4),
            ]
        );
        assert!(binary_search(&ptrs[..len], &GlobalPtr::new(1, 0)));
        assert!(!binary_search(&ptrs[..len], &GlobalPtr::new(1, 1)));
    }

    #[test]
    fn empty_inputs() {
        let mut empty: [u32; 0] = [];
        heap_sort(&mut empty);
        assert_eq!(remove_duplicates(&mut empty), 0);
        assert!(!binary_search(&empty, &1));
    }

    proptest! {
        #[test]
        fn heap_sort_matches_std(mut values in proptest::collection::vec(any::<u32>(), 0..256)) {
            let mut expected = values.clone();
            expected.sort_unstable();
            heap_sort(&mut values);
            prop_assert_eq!(values, expected);
        }

        #[test]
        fn dedup_matches_std(mut values in proptest::collection::vec(0u8..16, 0..128)) {
            values.sort_unstable();
            let mut expected = values.clone();
            expected.dedup();

            let len = remove_duplicates(&mut values);
            prop_assert_eq!(&values[..len], &expected[..]);
        }

        #[test]
        fn search_finds_exactly_members(
            mut values in proptest::collection::vec(0u16..512, 0..64),
            probe in 0u16..512,
        ) {
            heap_sort(&mut values);
            let len = remove_duplicates(&mut values);
            prop_assert_eq!(binary_search(&values[..len], &probe), values.contains(&probe));
        }
    }
}
