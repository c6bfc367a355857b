use os_sim::*;

mod common;

/// Walk `sequence` and check that each process's need fits in the work
/// vector at the moment it is chosen.
fn assert_valid_sequence(state: &ResourceState, sequence: &[usize]) {
    let mut work = state.available().to_vec();
    for &i in sequence {
        let p = state.process(i).unwrap();
        assert!(
            p.need.iter().zip(&work).all(|(n, w)| n <= w),
            "P{i} need {:?} exceeds work {work:?}",
            p.need
        );
        for (w, a) in work.iter_mut().zip(&p.allocated) {
            *w += a;
        }
    }
}

/// Test the textbook instance: safe, with the index-order greedy sequence.
#[test]
fn test_textbook_is_safe() {
    common::setup_test();
    let state = ResourceState::textbook();
    let report = check_safety(&state);
    assert!(report.safe);
    assert_eq!(report.sequence, vec![1, 3, 0, 2, 4]);
    assert_valid_sequence(&state, &report.sequence);
}

/// Test that the matrix constructor derives need = max − allocated.
#[test]
fn test_from_matrices_derives_need() {
    common::setup_test();
    let state = ResourceState::from_matrices(
        &[vec![7, 5, 3], vec![3, 2, 2], vec![9, 0, 2], vec![2, 2, 2], vec![4, 3, 3]],
        &[vec![0, 1, 0], vec![2, 0, 0], vec![3, 0, 2], vec![2, 1, 1], vec![0, 0, 2]],
        &[3, 3, 2],
    )
    .unwrap();
    assert_eq!(state, ResourceState::textbook());
    assert_eq!(state.process(0).unwrap().need, vec![7, 4, 3]);
    assert_eq!(state.num_processes(), 5);
    assert_eq!(state.num_resources(), 3);
}

/// Test a granted request and the follow-up rejections of the classic
/// exercise.
#[test]
fn test_request_sequence() {
    common::setup_test();
    let mut state = ResourceState::textbook();

    let granted = state.request(1, &[1, 0, 2]).unwrap();
    let RequestOutcome::Granted { sequence } = &granted else {
        panic!("expected grant, got {granted:?}");
    };
    assert_valid_sequence(&state, sequence);
    assert_eq!(state.available(), &[2, 3, 0]);
    assert_eq!(state.process(1).unwrap().allocated, vec![3, 0, 2]);
    assert_eq!(state.process(1).unwrap().need, vec![0, 2, 0]);

    // P4 asks for more A than is free.
    assert_eq!(
        state.request(4, &[3, 3, 0]).unwrap(),
        RequestOutcome::Rejected(RejectReason::ExceedsAvailable { resource: 0 })
    );

    // P0's request fits, but leaves nobody able to finish.
    let before = state.clone();
    let out = state.request(0, &[0, 2, 0]).unwrap();
    assert_eq!(out, RequestOutcome::Rejected(RejectReason::Unsafe));
    assert_eq!(state, before);
}

/// Test that a request beyond the declared need is refused.
#[test]
fn test_request_exceeds_need() {
    common::setup_test();
    let mut state = ResourceState::textbook();
    let out = state.request(3, &[0, 2, 0]).unwrap();
    assert_eq!(
        out,
        RequestOutcome::Rejected(RejectReason::ExceedsNeed { resource: 1 })
    );
    assert!(!out.is_granted());
    assert_eq!(state, ResourceState::textbook());
}

/// Test the reason wording reported for an unsafe request.
#[test]
fn test_unsafe_reason_wording() {
    assert_eq!(
        RejectReason::Unsafe.to_string(),
        "would produce an unsafe state"
    );
}

/// Test an unsafe state: the partial sequence holds only what could finish.
#[test]
fn test_unsafe_state() {
    common::setup_test();
    let state = ResourceState::from_matrices(
        &[vec![5], vec![5], vec![1]],
        &[vec![2], vec![2], vec![0]],
        &[1],
    )
    .unwrap();
    let report = check_safety(&state);
    assert!(!report.safe);
    assert_eq!(report.sequence, vec![2]);
}

/// Test that the scan restarts from index 0 after every finish.
#[test]
fn test_scan_restarts_from_top() {
    common::setup_test();
    // P0 can only finish after P1 returns its unit.
    let state = ResourceState::from_matrices(
        &[vec![2], vec![1], vec![3]],
        &[vec![0], vec![1], vec![1]],
        &[1],
    )
    .unwrap();
    let report = check_safety(&state);
    assert!(report.safe);
    assert_eq!(report.sequence, vec![1, 0, 2]);
}

/// Test that malformed input is invalid and bad indices are contract
/// violations.
#[test]
fn test_input_validation() {
    common::setup_test();
    let mut state = ResourceState::textbook();

    assert!(state.request(9, &[0, 0, 0]).unwrap_err().is_contract());
    assert!(matches!(
        state.request(0, &[0, 0]).unwrap_err(),
        SimError::InvalidInput(_)
    ));
    assert!(state.set_available(7, 1).unwrap_err().is_contract());

    // allocated > max
    assert!(ResourceState::from_matrices(&[vec![1]], &[vec![2]], &[0]).is_err());
    // ragged row
    assert!(ResourceState::from_matrices(&[vec![1, 1]], &[vec![0]], &[0, 0]).is_err());
    // row count mismatch
    assert!(ResourceState::from_matrices(&[vec![1], vec![1]], &[vec![0]], &[0]).is_err());
    // no resources
    assert!(ResourceState::from_matrices(&[vec![]], &[vec![]], &[]).is_err());
}

/// Test that cell edits keep need in step with max and allocation.
#[test]
fn test_cell_edits() {
    common::setup_test();
    let mut state = ResourceState::new(2, 2).unwrap();
    state.set_max(1, 0, 4).unwrap();
    state.set_allocated(1, 0, 1).unwrap();
    state.set_available(0, 3).unwrap();
    assert_eq!(state.process(1).unwrap().need, vec![3, 0]);

    assert!(check_safety(&state).safe);
    let out = state.request(1, &[3, 0]).unwrap();
    assert!(out.is_granted());
    assert_eq!(state.process(1).unwrap().need, vec![0, 0]);
    assert_eq!(state.available(), &[0, 0]);
}

/// Test that a full `u32` of available units plus an allocation does not
/// overflow the work vector.
#[test]
fn test_work_exceeds_u32() {
    common::setup_test();
    let state = ResourceState::from_matrices(
        &[vec![5], vec![u32::MAX]],
        &[vec![5], vec![3]],
        &[u32::MAX],
    )
    .unwrap();
    let report = check_safety(&state);
    assert!(report.safe);
    // P0 finishes first and pushes work past u32::MAX before P1 is checked.
    assert_eq!(report.sequence, vec![0, 1]);
}
