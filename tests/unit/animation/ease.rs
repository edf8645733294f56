use super::*;

const ALL: [Ease; 8] = [
    Ease::Linear,
    Ease::InQuad,
    Ease::OutQuad,
    Ease::InOutQuad,
    Ease::InCubic,
    Ease::OutCubic,
    Ease::InOutCubic,
    Ease::OutBack,
];

#[test]
fn endpoints_are_fixed() {
    for ease in ALL {
        assert!(ease.apply(0.0).abs() < 1e-12, "{ease:?}");
        assert!((ease.apply(1.0) - 1.0).abs() < 1e-12, "{ease:?}");
    }
}

#[test]
fn input_is_clamped() {
    assert_eq!(Ease::Linear.apply(-3.0), 0.0);
    assert_eq!(Ease::Linear.apply(7.0), 1.0);
}

#[test]
fn in_out_curves_are_symmetric_at_midpoint() {
    assert!((Ease::InOutQuad.apply(0.5) - 0.5).abs() < 1e-12);
    assert!((Ease::InOutCubic.apply(0.5) - 0.5).abs() < 1e-12);
    assert!(Ease::InQuad.apply(0.25) < 0.25);
    assert!(Ease::OutQuad.apply(0.25) > 0.25);
}

#[test]
fn out_back_overshoots() {
    let peak = (1..100)
        .map(|i| Ease::OutBack.apply(f64::from(i) / 100.0))
        .fold(f64::MIN, f64::max);
    assert!(peak > 1.0);
}

#[test]
fn serde_accepts_ids_and_short_aliases() {
    for ease in ALL {
        let json = serde_json::to_string(&ease).unwrap();
        assert_eq!(json, format!("\"{}\"", ease.id()));
    }
    assert_eq!(serde_json::from_str::<Ease>("\"quad\"").unwrap(), Ease::InOutQuad);
    assert_eq!(serde_json::from_str::<Ease>("\"cubic\"").unwrap(), Ease::InOutCubic);
    assert_eq!(Ease::default(), Ease::InOutQuad);
}
