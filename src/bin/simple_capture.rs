// 该文件是 DtexCamera 项目的一部分。
// src/bin/simple_capture.rs - 回放预览帧与运动数据并完成拍摄
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

use std::{
  path::PathBuf,
  sync::mpsc::{self, RecvTimeoutError},
  thread,
  time::Duration,
};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

use dtex_camera::{
  FromUrl,
  config::PipelineConfig,
  gate::Orientation,
  input::{ImageFileInput, ImageStillCapture, MotionReplay, stream_at_interval},
  model::{InferenceAdapter, ReplayEngine, ReplayEngineBuilder},
  output::CaptureRecordOutput,
  task::{CameraSession, SessionEvent},
};

/// DtexCamera 拍摄参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型，例如 replay:///path/to/model.json；缺省时使用配置文件中的模型
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,
  /// 预览帧来源，例如 image:///path/to/frame.jpg?repeat=100
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 运动样本文件（每行一个 JSON）
  #[arg(long, value_name = "MOTION")]
  pub motion: Option<PathBuf>,
  /// 拍摄结果保存位置，例如 record:///path/to/dir
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 流水线配置文件
  #[arg(long, value_name = "CONFIG")]
  pub config: Option<PathBuf>,
  /// 设备朝向
  #[arg(long, value_name = "ORIENTATION", default_value = "portrait")]
  pub orientation: Orientation,
  /// 预览帧率
  #[arg(long, value_name = "FPS", default_value_t = 15)]
  pub fps: u32,
  /// 按下快门前的预热时间（毫秒）
  #[arg(long, value_name = "MILLIS", default_value_t = 1000)]
  pub warmup: u64,
  /// 拍摄张数
  #[arg(long, value_name = "SHOTS", default_value_t = 1)]
  pub shots: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let config = match &args.config {
    Some(path) => PipelineConfig::from_json_file(path)?,
    None => PipelineConfig::default(),
  };
  let model = args.model.clone().or_else(|| config.model.clone());

  info!("模型: {:?}", model.as_ref().map(Url::as_str));
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let builder = model.and_then(|url| {
    ReplayEngineBuilder::from_url(&url)
      .inspect_err(|e| error!("无法解析模型地址 {}: {}", url, e))
      .ok()
  });
  let adapter = InferenceAdapter::<ReplayEngine>::load(builder);

  let input = ImageFileInput::from_url(&args.input)?;
  let still = ImageStillCapture::new(input.image().clone()).with_latency(Duration::from_millis(50));
  let frames = stream_at_interval(
    input.into_frames(),
    Duration::from_secs_f64(1.0 / f64::from(args.fps.max(1))),
  );

  let motion = match &args.motion {
    Some(path) => MotionReplay::from_path(path)?.into_stream(config.motion_interval(), true),
    None => {
      warn!("未提供运动数据，旋转与抖动保持初始值");
      mpsc::channel().1
    }
  };

  let output = CaptureRecordOutput::from_url(&args.output)?;

  let (stop_tx, stop_rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = stop_tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let (session, events) = CameraSession::start(&config, adapter, still, frames, motion)?;
  session.set_orientation(args.orientation);

  thread::sleep(Duration::from_millis(args.warmup));
  info!("当前判定: {}", session.verdict());
  session.shutter();

  let mut saved = 0;
  while saved < args.shots {
    if stop_rx.try_recv().is_ok() {
      break;
    }
    let event = match events.recv_timeout(Duration::from_millis(100)) {
      Ok(event) => event,
      Err(RecvTimeoutError::Timeout) => continue,
      Err(RecvTimeoutError::Disconnected) => break,
    };
    match event {
      SessionEvent::ReviewReady(result) => {
        info!(
          "照片已送达: {} 字节, 可接受: {}",
          result.image().len(),
          result.acceptable()
        );
        session.accept();
      }
      SessionEvent::Accepted(result) => {
        let path = output.record(&result)?;
        saved += 1;
        info!("第 {} 张已保存: {}", saved, path.display());
        if saved < args.shots {
          session.shutter();
        }
      }
      SessionEvent::CaptureFailed(e) => {
        warn!("拍摄失败，重新拍摄: {}", e);
        session.shutter();
      }
    }
  }

  let stats = session.stats();
  info!(
    "共保存 {} 张, 分析 {} 帧, 丢弃 {} 帧",
    saved, stats.analysed, stats.dropped
  );
  session.stop();

  Ok(())
}
