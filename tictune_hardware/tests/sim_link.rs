use rstest::rstest;
use tictune_hardware::{LinkError, PRODUCT_ID_T249, PRODUCT_ID_T825, SimulatedTic};
use tictune_traits::DeviceSession;

fn link_error(err: &tictune_traits::BoxError) -> &LinkError {
    err.downcast_ref::<LinkError>().expect("LinkError")
}

#[rstest]
#[case(&[0x85, 0x00], "expects 1 bytes")]
#[case(&[0xE0, 0x00, 0x00], "expects 6 bytes")]
#[case(&[], "empty frame")]
fn malformed_frames_are_rejected(#[case] frame: &[u8], #[case] needle: &str) {
    let mut tic = SimulatedTic::new(PRODUCT_ID_T825);
    let err = tic.send(frame).unwrap_err();
    assert!(matches!(link_error(&err), LinkError::Malformed(_)));
    assert!(err.to_string().contains(needle), "{err}");
}

#[rstest]
fn unknown_opcode_is_rejected() {
    let mut tic = SimulatedTic::new(PRODUCT_ID_T825);
    let err = tic.send(&[0x42]).unwrap_err();
    assert!(matches!(link_error(&err), LinkError::Rejected(0x42)));
    assert!(tic.query(0x55, 4).is_err());
}

#[rstest]
fn set_setting_lands_after_msb_unpacking() {
    let mut tic = SimulatedTic::new(PRODUCT_ID_T825);
    let h = tic.handle();
    // value 0xC8 at offset 0x47: bit 7 of the value travels in the msb byte
    tic.send(&[0x13, 0b10, 0x47, 0x48]).unwrap();
    assert_eq!(h.setting_byte(0x47), Some(0xC8));
    let block = tic.query(0xA8, 0x70).unwrap();
    assert_eq!(block.len(), 0x70);
    assert_eq!(block[0x47], 0xC8);

    // offset 0xC7 is past the settings block
    let err = tic.send(&[0x13, 0b01, 0x47, 0x00]).unwrap_err();
    assert!(matches!(link_error(&err), LinkError::Malformed(_)));
}

#[rstest]
#[case(PRODUCT_ID_T825, 0x56, 0)]
#[case(PRODUCT_ID_T249, 0x5A, 1)]
fn variable_block_size_and_agc(#[case] pid: u16, #[case] len: usize, #[case] agc: u8) {
    let mut tic = SimulatedTic::new(pid);
    let vars = tic.query(0xA1, len).unwrap();
    assert_eq!(vars.len(), len);
    assert_eq!(vars[0x00], 2, "starts de-energized");
    if len > 0x56 {
        assert_eq!(vars[0x56], agc);
    }
}

#[rstest]
fn energized_motion_sags_vin() {
    let mut tic = SimulatedTic::new(PRODUCT_ID_T825);
    let vin = |v: &[u8]| u16::from_le_bytes([v[0x33], v[0x34]]);
    let idle = vin(&tic.query(0xA1, 0x56).unwrap());
    tic.send(&[0x85]).unwrap();
    tic.send(&[0x83]).unwrap();
    let energized = vin(&tic.query(0xA1, 0x56).unwrap());
    assert!(energized < idle);
    // 1000 steps away: the motor moves at max speed and sags further
    tic.send(&[0xE0, 0x01, 0x68, 0x03, 0x00, 0x00]).unwrap();
    let moving = vin(&tic.query(0xA1, 0x56).unwrap());
    assert!(moving < energized);
}

#[rstest]
fn disconnect_fails_both_directions() {
    let mut tic = SimulatedTic::new(PRODUCT_ID_T825);
    tic.handle().set_disconnected(true);
    assert!(matches!(
        link_error(&tic.send(&[0x85]).unwrap_err()),
        LinkError::Disconnected
    ));
    assert!(matches!(
        link_error(&tic.query(0xA1, 0x56).unwrap_err()),
        LinkError::Disconnected
    ));
}
