use os_sim::*;

mod common;

fn pool() -> BuddyAllocator {
    BuddyAllocator::new(BuddyConfig::default()).unwrap()
}

fn granted(out: AllocOutcome) -> BlockId {
    match out {
        AllocOutcome::Granted { block, .. } => block,
        other => panic!("expected a grant, got {other:?}"),
    }
}

fn shape(buddy: &BuddyAllocator) -> Vec<(u64, u64, bool)> {
    buddy
        .leaves()
        .iter()
        .map(|b| (b.offset, b.size, b.allocated))
        .collect()
}

/// Test that allocate then free merges all the way back to one free root,
/// and that the whole upper half is then available.
#[test]
fn test_round_trip() {
    common::setup_test();
    let mut buddy = pool();
    let pristine = shape(&buddy);

    let block = granted(buddy.allocate(10).unwrap());
    assert!(!buddy.is_pristine());
    buddy.free(block).unwrap();
    assert!(buddy.is_pristine());
    assert_eq!(shape(&buddy), pristine);

    granted(buddy.allocate(64).unwrap());
    assert_eq!(shape(&buddy), vec![(0, 64, true), (64, 64, false)]);
}

/// Test that allocations are placed first-fit, left to right.
#[test]
fn test_first_fit_placement() {
    common::setup_test();
    let mut buddy = pool();
    granted(buddy.allocate(10).unwrap());
    granted(buddy.allocate(30).unwrap());
    granted(buddy.allocate(16).unwrap());
    assert_eq!(
        shape(&buddy),
        vec![
            (0, 16, true),
            (16, 16, true),
            (32, 32, true),
            (64, 64, false),
        ]
    );
    assert_eq!(buddy.used(), 64);
    assert_eq!(buddy.usage_percent(), 50.0);
}

/// Test that the smallest free block that fits wins over an earlier,
/// larger one.
#[test]
fn test_smallest_fit_placement() {
    common::setup_test();
    let mut buddy = pool();
    let big = granted(buddy.allocate(64).unwrap());
    granted(buddy.allocate(32).unwrap());
    buddy.free(big).unwrap();

    // 64 free at 0 comes first, but the 32 free at 96 is the tighter fit.
    granted(buddy.allocate(16).unwrap());
    assert_eq!(
        shape(&buddy),
        vec![
            (0, 64, false),
            (64, 32, true),
            (96, 16, true),
            (112, 16, false),
        ]
    );
}

/// Test that equally sized free blocks are taken left to right.
#[test]
fn test_smallest_fit_tie_goes_left() {
    common::setup_test();
    let mut buddy = pool();
    let blocks: Vec<BlockId> = (0..4)
        .map(|_| granted(buddy.allocate(32).unwrap()))
        .collect();
    buddy.free(blocks[3]).unwrap();
    buddy.free(blocks[1]).unwrap();

    granted(buddy.allocate(32).unwrap());
    assert_eq!(
        shape(&buddy),
        vec![
            (0, 32, true),
            (32, 32, true),
            (64, 32, true),
            (96, 32, false),
        ]
    );
}

/// Test that fragmented free space does not satisfy a larger request.
#[test]
fn test_fragmentation_is_insufficient() {
    common::setup_test();
    let mut buddy = pool();
    let blocks: Vec<BlockId> = (0..4)
        .map(|_| granted(buddy.allocate(32).unwrap()))
        .collect();
    assert_eq!(buddy.largest_free_block(), 0);

    // Free two blocks that are not buddies of each other.
    buddy.free(blocks[0]).unwrap();
    buddy.free(blocks[2]).unwrap();
    assert_eq!(buddy.used(), 64);
    assert_eq!(
        buddy.allocate(64).unwrap(),
        AllocOutcome::Insufficient {
            requested: 64,
            largest_free: 32,
        }
    );

    // Freeing the left buddy's partner lets the left half merge.
    buddy.free(blocks[1]).unwrap();
    let big = buddy.allocate(64).unwrap();
    assert!(matches!(big, AllocOutcome::Granted { size: 64, .. }));
    assert_eq!(shape(&buddy)[0], (0, 64, true));
}

/// Test that merging stops at the first ancestor whose other half is in use.
#[test]
fn test_partial_merge() {
    common::setup_test();
    let mut buddy = pool();
    let a = granted(buddy.allocate(16).unwrap());
    let _b = granted(buddy.allocate(16).unwrap());
    let _c = granted(buddy.allocate(64).unwrap());

    buddy.free(a).unwrap();
    assert_eq!(
        shape(&buddy),
        vec![
            (0, 16, false),
            (16, 16, true),
            (32, 32, false),
            (64, 64, true),
        ]
    );
}

/// Test that leaves always tile the pool exactly.
#[test]
fn test_leaves_tile_pool() {
    common::setup_test();
    let mut buddy = pool();
    let mut live = Vec::new();
    for size in [3, 17, 1, 8, 30, 2, 5] {
        if let Some(block) = buddy.allocate(size).unwrap().block() {
            live.push(block);
        }
    }
    for (i, block) in live.into_iter().enumerate() {
        if i % 2 == 0 {
            buddy.free(block).unwrap();
        }
        let mut offset = 0;
        for leaf in buddy.leaves() {
            assert_eq!(leaf.offset, offset);
            assert!(leaf.size.is_power_of_two());
            assert_eq!(leaf.offset % leaf.size, 0);
            offset += leaf.size;
        }
        assert_eq!(offset, 128);
    }
}

/// Test that sizes outside [min_block, pool] are invalid input.
#[test]
fn test_size_bounds() {
    common::setup_test();
    let mut buddy = pool();
    assert!(matches!(
        buddy.allocate(0).unwrap_err(),
        SimError::InvalidInput(_)
    ));
    assert!(matches!(
        buddy.allocate(129).unwrap_err(),
        SimError::InvalidInput(_)
    ));
    assert!(buddy.is_pristine());
    granted(buddy.allocate(128).unwrap());
    assert_eq!(buddy.usage_percent(), 100.0);
}

/// Test that a double free is a contract violation.
#[test]
fn test_double_free() {
    common::setup_test();
    let mut buddy = pool();
    let keep = granted(buddy.allocate(64).unwrap());
    let block = granted(buddy.allocate(8).unwrap());
    buddy.free(block).unwrap();
    let err = buddy.free(block).unwrap_err();
    assert!(err.is_contract());
    buddy.free(keep).unwrap();
    assert!(buddy.is_pristine());
}

/// Test that a handle kept after its block was freed cannot free a later
/// block that reuses the same slot.
#[test]
fn test_stale_handle_rejected() {
    common::setup_test();
    let mut buddy = pool();
    let stale = granted(buddy.allocate(64).unwrap());
    buddy.free(stale).unwrap();

    let first = granted(buddy.allocate(64).unwrap());
    let second = granted(buddy.allocate(64).unwrap());
    assert_ne!(first, stale);
    assert_ne!(second, stale);
    assert_eq!(buddy.used(), 128);

    let err = buddy.free(stale).unwrap_err();
    assert!(err.is_contract());
    assert_eq!(buddy.used(), 128);

    buddy.free(first).unwrap();
    buddy.free(second).unwrap();
    assert!(buddy.is_pristine());
}

/// Test that re-allocating the same leaf without a merge issues a new handle.
#[test]
fn test_reallocated_leaf_gets_new_handle() {
    common::setup_test();
    let mut buddy = pool();
    let old = granted(buddy.allocate(64).unwrap());
    let _pin = granted(buddy.allocate(64).unwrap());
    buddy.free(old).unwrap();

    let new = granted(buddy.allocate(64).unwrap());
    assert_eq!(new.index, old.index);
    assert_ne!(new, old);
    assert!(buddy.free(old).unwrap_err().is_contract());
    assert_eq!(buddy.used(), 128);
}
