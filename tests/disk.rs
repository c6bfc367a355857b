use os_sim::disk::compute;
use os_sim::*;

mod common;

const QUEUE: [Cylinder; 8] = [98, 183, 37, 122, 14, 124, 65, 67];

fn run(policy: DiskPolicy, requests: &[Cylinder], head: Cylinder) -> DiskSchedule {
    compute(policy, requests, head, DiskGeometry::default()).unwrap()
}

fn leg_sum(path: &[Cylinder]) -> u64 {
    path.windows(2)
        .map(|w| u64::from(w[0].abs_diff(w[1])))
        .sum()
}

/// Test the classic queue under every policy.
#[test]
fn test_classic_queue() {
    common::setup_test();
    let expected = [
        (DiskPolicy::Fcfs, 640),
        (DiskPolicy::Sstf, 236),
        (DiskPolicy::Scan, 331),
        (DiskPolicy::CScan, 382),
        (DiskPolicy::Look, 299),
        (DiskPolicy::CLook, 322),
    ];
    for (policy, seek) in expected {
        let s = run(policy, &QUEUE, 53);
        assert_eq!(s.total_seek, seek, "{policy}");
        assert_eq!(s.policy, policy);
    }
}

/// Test the exact head paths of the sweep policies.
#[test]
fn test_classic_paths() {
    common::setup_test();
    assert_eq!(
        run(DiskPolicy::Sstf, &QUEUE, 53).head_movement,
        vec![53, 65, 67, 37, 14, 98, 122, 124, 183]
    );
    assert_eq!(
        run(DiskPolicy::Scan, &QUEUE, 53).head_movement,
        vec![53, 65, 67, 98, 122, 124, 183, 199, 37, 14]
    );
    assert_eq!(
        run(DiskPolicy::CScan, &QUEUE, 53).head_movement,
        vec![53, 65, 67, 98, 122, 124, 183, 199, 0, 14, 37]
    );
    assert_eq!(
        run(DiskPolicy::Look, &QUEUE, 53).head_movement,
        vec![53, 65, 67, 98, 122, 124, 183, 37, 14]
    );
    assert_eq!(
        run(DiskPolicy::CLook, &QUEUE, 53).head_movement,
        vec![53, 65, 67, 98, 122, 124, 183, 14, 37]
    );
}

/// Test that total seek always equals the sum of the legs and the path
/// starts at the head.
#[test]
fn test_seek_is_sum_of_legs() {
    common::setup_test();
    let workloads: [(&[Cylinder], Cylinder); 6] = [
        (&QUEUE, 53),
        (&QUEUE, 0),
        (&QUEUE, 199),
        (&[10, 190, 10, 100], 100),
        (&[5], 150),
        (&[150, 151, 149], 150),
    ];
    for (requests, head) in workloads {
        for policy in DiskPolicy::ALL {
            let s = run(policy, requests, head);
            assert_eq!(s.head_movement[0], head, "{policy}");
            assert_eq!(s.total_seek, leg_sum(&s.head_movement), "{policy}");
        }
    }
}

/// Test that every request is visited by every policy.
#[test]
fn test_every_request_serviced() {
    common::setup_test();
    for policy in DiskPolicy::ALL {
        let s = run(policy, &QUEUE, 53);
        for r in QUEUE {
            assert!(s.head_movement.contains(&r), "{policy} skipped {r}");
        }
    }
}

/// Test SCAN at the head's own cylinder: no wasted leg, bound still visited.
#[test]
fn test_scan_boundary() {
    common::setup_test();
    let s = run(DiskPolicy::Scan, &[50], 50);
    assert_eq!(s.head_movement, vec![50, 199]);
    assert_eq!(s.total_seek, 149);

    let s = run(DiskPolicy::Scan, &[50, 20], 50);
    assert_eq!(s.head_movement, vec![50, 199, 20]);
    assert_eq!(s.total_seek, 149 + 179);
}

/// Test that SCAN with the head parked on the upper bound just reverses.
#[test]
fn test_scan_head_on_bound() {
    common::setup_test();
    let s = run(DiskPolicy::Scan, &[10], 199);
    assert_eq!(s.head_movement, vec![199, 10]);
}

/// Test that C-SCAN skips the wrap when nothing lies below the head.
#[test]
fn test_cscan_no_left_no_wrap() {
    common::setup_test();
    let s = run(DiskPolicy::CScan, &[60, 70], 50);
    assert_eq!(s.head_movement, vec![50, 60, 70]);
    assert_eq!(s.total_seek, 20);
}

/// Test that custom bounds drive the SCAN and C-SCAN trips.
#[test]
fn test_custom_geometry() {
    common::setup_test();
    let geometry = DiskGeometry::new(10, 99).unwrap();
    let s = compute(DiskPolicy::CScan, &[20, 80], 50, geometry).unwrap();
    assert_eq!(s.head_movement, vec![50, 80, 99, 10, 20]);
    assert_eq!(s.total_seek, 30 + 19 + 89 + 10);

    let err = compute(DiskPolicy::Fcfs, &[5], 50, geometry).unwrap_err();
    assert!(matches!(err, SimError::InvalidInput(_)));
    let err = compute(DiskPolicy::Fcfs, &[20], 100, geometry).unwrap_err();
    assert!(matches!(err, SimError::InvalidInput(_)));
}

/// Test that SSTF breaks distance ties by input order.
#[test]
fn test_sstf_tie_first_in_input() {
    common::setup_test();
    let s = run(DiskPolicy::Sstf, &[60, 40], 50);
    assert_eq!(s.head_movement, vec![50, 60, 40]);
    let s = run(DiskPolicy::Sstf, &[40, 60], 50);
    assert_eq!(s.head_movement, vec![50, 40, 60]);
}

/// Test that identical inputs give identical schedules.
#[test]
fn test_deterministic() {
    common::setup_test();
    for policy in DiskPolicy::ALL {
        assert_eq!(run(policy, &QUEUE, 53), run(policy, &QUEUE, 53));
    }
}

/// Test the per-request average.
#[test]
fn test_average_seek() {
    common::setup_test();
    let s = run(DiskPolicy::Fcfs, &QUEUE, 53);
    assert_eq!(s.average_seek(QUEUE.len()), 80.0);
}
