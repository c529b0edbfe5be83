//! Weight import and record persistence.
//!
//! PyTorch checkpoints name layers by `nn.Sequential` index (`m_down1.2.weight`)
//! while [`Scunet`] uses named fields (`m_down1.downsample.weight`).
//! [`key_remaps`] produces the regex rewrites that bridge the two for a given
//! [`ScunetConfig`]; `burn-import` applies them in order to every key.
//!
//! Converted models are stored as Burn named MessagePack records, either at
//! full (f32) or half (f16) precision.

use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, HalfPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};

use crate::{
    config::ScunetConfig,
    error::{ScunetError, ScunetResult},
};

/// Floating point precision of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    Full,
    Half,
}

/// Regex rewrites from PyTorch state-dict keys to [`Scunet`](crate::Scunet)
/// record paths, in application order.
pub fn key_remaps(config: &ScunetConfig) -> Vec<(String, String)> {
    let mut remaps = vec![
        // Checkpoints saved from the inference wrapper.
        (r"^model\.(.+)".to_string(), "$1".to_string()),
        (r"^m_head\.0\.(.+)".to_string(), "m_head.$1".to_string()),
        (r"^m_tail\.0\.(.+)".to_string(), "m_tail.$1".to_string()),
    ];

    let [down1, down2, down3, _, up3, up2, up1] = config.depths;

    for (stage, depth) in [("m_down1", down1), ("m_down2", down2), ("m_down3", down3)] {
        remaps.push((
            format!(r"^{stage}\.{depth}\.(.+)"),
            format!("{stage}.downsample.$1"),
        ));
        remaps.push((
            format!(r"^{stage}\.(\d+)\.(.+)"),
            format!("{stage}.blocks.$1.$2"),
        ));
    }

    for (stage, depth) in [("m_up3", up3), ("m_up2", up2), ("m_up1", up1)] {
        remaps.push((format!(r"^{stage}\.0\.(.+)"), format!("{stage}.upsample.$1")));
        // Sequential index i holds block i - 1; regex replacements cannot do arithmetic.
        for i in 1..=depth {
            remaps.push((
                format!(r"^{stage}\.{i}\.(.+)"),
                format!("{stage}.blocks.{}.$1", i - 1),
            ));
        }
    }

    remaps.extend([
        (
            r"(.+)\.conv_block\.0\.(.+)".to_string(),
            "$1.conv_block.conv1.$2".to_string(),
        ),
        (
            r"(.+)\.conv_block\.2\.(.+)".to_string(),
            "$1.conv_block.conv2.$2".to_string(),
        ),
        (r"(.+)\.mlp\.0\.(.+)".to_string(), "$1.mlp.fc1.$2".to_string()),
        (r"(.+)\.mlp\.2\.(.+)".to_string(), "$1.mlp.fc2.$2".to_string()),
    ]);

    remaps
}

/// Reads a PyTorch `.pth` state dict into a model built from `config`.
#[cfg(feature = "pretrained")]
pub fn load_pytorch_weights<B: Backend>(
    path: &Path,
    config: &ScunetConfig,
    device: &B::Device,
) -> ScunetResult<crate::Scunet<B>> {
    use burn::record::Recorder;
    use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

    let model = config.init::<B>(device)?;

    let load_args = key_remaps(config)
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });

    tracing::debug!(path = %path.display(), "loading PyTorch checkpoint");
    let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(load_args, device)
        .map_err(|e| ScunetError::WeightLoadingFailed {
            reason: format!("PyTorch checkpoint '{}': {e}", path.display()),
        })?;

    Ok(model.load_record(record))
}

/// Writes `module` as a named MessagePack record. The recorder sets the
/// `.mpk` extension on `path`.
pub fn save_record<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    precision: Precision,
) -> ScunetResult<()> {
    let result = match precision {
        Precision::Full => module.save_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
        ),
        Precision::Half => module.save_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<HalfPrecisionSettings>::new(),
        ),
    };

    result.map_err(|e| ScunetError::RecordSaveFailed {
        reason: format!("'{}': {e}", path.display()),
    })?;
    tracing::debug!(path = %path.display(), ?precision, "saved record");

    Ok(())
}

/// Loads a named MessagePack record written by [`save_record`] into `module`.
pub fn load_record<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    precision: Precision,
    device: &B::Device,
) -> ScunetResult<M> {
    let result = match precision {
        Precision::Full => module.load_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            device,
        ),
        Precision::Half => module.load_file(
            path.to_path_buf(),
            &NamedMpkFileRecorder::<HalfPrecisionSettings>::new(),
            device,
        ),
    };

    result.map_err(|e| ScunetError::WeightLoadingFailed {
        reason: format!("record '{}': {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, prelude::*, tensor::Distribution};

    type TestBackend = NdArray;

    fn small_config() -> ScunetConfig {
        ScunetConfig::new()
            .with_dim(8)
            .with_head_dim(4)
            .with_window_size(4)
            .with_depths([2, 1, 1, 1, 1, 1, 3])
            .with_input_resolution(64)
    }

    fn has(remaps: &[(String, String)], pattern: &str, replacement: &str) -> bool {
        remaps
            .iter()
            .any(|(p, r)| p == pattern && r == replacement)
    }

    #[test]
    fn test_downsample_index_follows_stage_depth() {
        let remaps = key_remaps(&small_config());

        assert!(has(&remaps, r"^m_down1\.2\.(.+)", "m_down1.downsample.$1"));
        assert!(has(&remaps, r"^m_down2\.1\.(.+)", "m_down2.downsample.$1"));
        assert!(has(&remaps, r"^m_down1\.(\d+)\.(.+)", "m_down1.blocks.$1.$2"));
    }

    #[test]
    fn test_downsample_rewrite_precedes_block_rewrite() {
        let remaps = key_remaps(&small_config());
        let position = |pattern: &str| remaps.iter().position(|(p, _)| p == pattern).unwrap();

        assert!(position(r"^m_down3\.1\.(.+)") < position(r"^m_down3\.(\d+)\.(.+)"));
    }

    #[test]
    fn test_up_stage_blocks_are_shifted_by_one() {
        let remaps = key_remaps(&small_config());

        assert!(has(&remaps, r"^m_up1\.0\.(.+)", "m_up1.upsample.$1"));
        assert!(has(&remaps, r"^m_up1\.1\.(.+)", "m_up1.blocks.0.$1"));
        assert!(has(&remaps, r"^m_up1\.3\.(.+)", "m_up1.blocks.2.$1"));
        assert!(!remaps.iter().any(|(p, _)| p == r"^m_up1\.4\.(.+)"));
        assert!(has(&remaps, r"^m_up3\.1\.(.+)", "m_up3.blocks.0.$1"));
    }

    #[test]
    fn test_wrapper_prefix_is_stripped_first() {
        let remaps = key_remaps(&small_config());

        assert_eq!(remaps[0], (r"^model\.(.+)".to_string(), "$1".to_string()));
        assert!(has(&remaps, r"(.+)\.mlp\.2\.(.+)", "$1.mlp.fc2.$2"));
        assert!(has(&remaps, r"(.+)\.conv_block\.0\.(.+)", "$1.conv_block.conv1.$2"));
    }

    fn remap(remaps: &[(String, String)], key: &str) -> String {
        remaps.iter().fold(key.to_string(), |key, (pattern, replacement)| {
            regex::Regex::new(pattern)
                .unwrap()
                .replace_all(&key, replacement.as_str())
                .into_owned()
        })
    }

    #[test]
    fn test_checkpoint_keys_map_to_record_paths() {
        let remaps = key_remaps(&ScunetConfig::released(3));

        for (key, expected) in [
            ("m_head.0.weight", "m_head.weight"),
            ("model.m_tail.0.bias", "m_tail.bias"),
            ("m_down1.4.weight", "m_down1.downsample.weight"),
            ("m_down1.0.conv1_1.weight", "m_down1.blocks.0.conv1_1.weight"),
            (
                "m_down1.3.trans_block.mlp.2.bias",
                "m_down1.blocks.3.trans_block.mlp.fc2.bias",
            ),
            (
                "m_down3.2.trans_block.msa.relative_position_params",
                "m_down3.blocks.2.trans_block.msa.relative_position_params",
            ),
            (
                "m_body.1.conv_block.2.weight",
                "m_body.1.conv_block.conv2.weight",
            ),
            ("m_up2.0.weight", "m_up2.upsample.weight"),
            ("m_up1.1.conv1_2.weight", "m_up1.blocks.0.conv1_2.weight"),
            ("m_up1.4.conv1_1.bias", "m_up1.blocks.3.conv1_1.bias"),
            (
                "m_up3.2.conv_block.0.bias",
                "m_up3.blocks.1.conv_block.conv1.bias",
            ),
            (
                "m_up3.4.trans_block.mlp.0.weight",
                "m_up3.blocks.3.trans_block.mlp.fc1.weight",
            ),
        ] {
            assert_eq!(remap(&remaps, key), expected, "remapping {key}");
        }
    }

    #[test]
    fn test_half_precision_record_round_trip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scunet");

        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::random([1, 3, 64, 64], Distribution::Uniform(0.0, 1.0), &device);
        let expected = model.forward(x.clone()).unwrap();

        save_record(model, &path, Precision::Half).unwrap();
        assert!(path.with_extension("mpk").exists());

        let fresh = small_config().init::<TestBackend>(&device).unwrap();
        let restored = load_record(fresh, &path, Precision::Half, &device).unwrap();
        let actual = restored.forward(x).unwrap();

        // f16 storage keeps about three significant digits.
        let diff: f32 = (actual - expected.clone()).abs().max().into_scalar();
        let scale: f32 = expected.abs().max().into_scalar();
        assert!(diff <= 2e-2 * scale.max(1.0), "diff {diff} at scale {scale}");
    }

    #[test]
    fn test_full_precision_record_round_trip_is_exact() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scunet.mpk");

        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::random([1, 3, 64, 64], Distribution::Uniform(0.0, 1.0), &device);
        let expected = model.forward(x.clone()).unwrap();

        save_record(model, &path, Precision::Full).unwrap();
        let fresh = small_config().init::<TestBackend>(&device).unwrap();
        let restored = load_record(fresh, &path, Precision::Full, &device).unwrap();

        restored
            .forward(x)
            .unwrap()
            .into_data()
            .assert_eq(&expected.into_data(), true);
    }

    #[test]
    fn test_missing_record_is_a_loading_error() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();

        let result = load_record(model, Path::new("missing/scunet.mpk"), Precision::Full, &device);

        assert!(matches!(result, Err(ScunetError::WeightLoadingFailed { .. })));
    }
}
