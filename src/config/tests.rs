//! Tests for YAML configuration loading

use super::*;
use crate::distill::PadEdge;
use std::io::Write;

const EXAMPLE: &str = r#"
losses:
  - type: ChannelWiseDivergence
    name: loss_fpn_0
    student_channels: 128
    teacher_channels: 256
    tau: 1.0
    weight: 3.0
  - type: cwd
    name: loss_fpn_1
    student_channels: 256
    teacher_channels: 256
    pad_edge: trailing
    seed: 7
"#;

#[test]
fn test_parse_example_config() {
    let spec = parse_config(EXAMPLE).unwrap();

    assert_eq!(spec.losses.len(), 2);
    let first = &spec.losses[0];
    assert_eq!(first.type_name, "ChannelWiseDivergence");
    assert_eq!(first.name, "loss_fpn_0");
    assert_eq!((first.student_channels, first.teacher_channels), (128, 256));
    assert_eq!(first.weight, 3.0);
    assert_eq!(first.pad_edge, PadEdge::Leading);
    assert_eq!(first.seed, None);

    let second = &spec.losses[1];
    assert_eq!(second.type_name, "cwd");
    assert_eq!(second.tau, 1.0);
    assert_eq!(second.weight, 1.0);
    assert_eq!(second.pad_edge, PadEdge::Trailing);
    assert_eq!(second.seed, Some(7));
}

#[test]
fn test_type_defaults_to_channel_wise_divergence() {
    let spec = parse_config("losses:\n  - student_channels: 4\n    teacher_channels: 4\n").unwrap();
    assert_eq!(spec.losses[0].type_name, "ChannelWiseDivergence");
}

#[test]
fn test_missing_channels_is_parse_error() {
    let err = parse_config("losses:\n  - tau: 2.0\n").unwrap_err();
    assert!(err.to_string().contains("Failed to parse YAML config"));
}

#[test]
fn test_invalid_tau_is_config_error() {
    let yaml = "losses:\n  - student_channels: 4\n    teacher_channels: 4\n    tau: 0.0\n";
    let err = parse_config(yaml).unwrap_err();
    assert!(matches!(err, crate::Error::ConfigError(_)));
    assert!(err.to_string().contains("Invalid temperature"));
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(EXAMPLE.as_bytes()).unwrap();

    let spec = load_config(file.path()).unwrap();
    assert_eq!(spec.losses.len(), 2);
}

#[test]
fn test_load_config_missing_file() {
    let err = load_config("/nonexistent/destila.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn test_save_then_load_preserves_spec() {
    let spec = DistillSpec {
        losses: vec![LossSpec::channel_wise(64, 32)
            .with_name("neck")
            .with_tau(4.0)
            .with_weight(0.5)
            .with_pad_edge(PadEdge::Trailing)
            .with_seed(3)],
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("distill.yaml");

    save_config(&spec, &path).unwrap();
    let loaded = load_config(&path).unwrap();

    assert_eq!(loaded, spec);
}

#[test]
fn test_saved_config_spells_out_defaults() {
    let spec = parse_config("losses:\n  - student_channels: 8\n    teacher_channels: 4\n").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resolved.yaml");

    save_config(&spec, &path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();

    assert!(written.contains("type: ChannelWiseDivergence"));
    assert!(written.contains("pad_edge: leading"));
    assert_eq!(parse_config(&written).unwrap(), spec);
}
