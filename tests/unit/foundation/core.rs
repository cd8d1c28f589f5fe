use super::*;

#[test]
fn frame_range_rejects_reversed_bounds() {
    assert!(FrameRange::new(5, 4).is_err());
    assert!(FrameRange::new(5, 5).is_ok());
}

#[test]
fn frame_range_is_inclusive() {
    let r = FrameRange::new(2, 5).unwrap();
    assert_eq!(r.len_frames(), 4);
    assert!(!r.contains(1));
    assert!(r.contains(2));
    assert!(r.contains(5));
    assert!(!r.contains(6));
}

#[test]
fn clamp_pins_to_bounds() {
    let r = FrameRange::new(10, 20).unwrap();
    assert_eq!(r.clamp(3), 10);
    assert_eq!(r.clamp(15), 15);
    assert_eq!(r.clamp(99), 20);
}

#[test]
fn single_frame_has_length_one() {
    assert_eq!(FrameRange::new(-3, -3).unwrap().len_frames(), 1);
}
