// 该文件是 DtexCamera 项目的一部分。
// src/bin/simple_preview.rs - 对单张图像推理并保存检测框叠加图
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use url::Url;

use dtex_camera::{
  FromUrl,
  config::PipelineConfig,
  frame::Frame,
  input::ImageFileInput,
  model::{InferenceAdapter, RankedGroups, ReplayEngine, ReplayEngineBuilder},
  output::{Render, SaveImageFileOutput},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型，例如 replay:///path/to/model.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///path/to/frame.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 叠加图保存位置，例如 image:///path/to/preview.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 流水线配置文件
  #[arg(long, value_name = "CONFIG")]
  pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = match &args.config {
    Some(path) => PipelineConfig::from_json_file(path)?,
    None => PipelineConfig::default(),
  };

  let builder = ReplayEngineBuilder::from_url(&args.model)?;
  let mut adapter = InferenceAdapter::<ReplayEngine>::load(Some(builder));
  if !adapter.is_enabled() {
    bail!("模型不可用: {}", args.model);
  }

  let input = ImageFileInput::from_url(&args.input)?;
  let output = SaveImageFileOutput::from_url(&args.output)?;

  for (index, frame) in input.into_frames().enumerate() {
    let ranked = match adapter.infer(&frame)? {
      Some(detections) => detections.rank(&config.aggregate),
      None => RankedGroups::default(),
    };
    for group in &ranked.groups {
      info!(
        "帧 {}: 类别 {}, 最高分 {:.3}, {} 个框",
        index,
        group.category,
        group.max_score,
        group.boxes.len()
      );
    }
    info!("帧 {}: 检测到目标: {}", index, ranked.any_detected);
    render(&output, &frame, &ranked)?;
  }

  Ok(())
}

fn render(output: &SaveImageFileOutput, frame: &Frame, ranked: &RankedGroups) -> Result<()> {
  output.render_result(frame, ranked)?;
  info!("叠加图已保存: {}", output.path());
  Ok(())
}
