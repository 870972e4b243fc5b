//! MJPEG 视频流泵
//!
//! 打开 `GET /stream` 长连接，由独立的读线程按 8KB 块读取响应体，经 channel
//! 交给泵线程喂给 [`MjpegDecoder`]。泵线程同时等待取消信号和空闲超时，
//! 因此停止时不会卡在阻塞读取上。每切出一帧：
//!
//! 1. 距上一次显示不足 `min_display_interval` 的帧直接丢弃（先限速再解码，
//!    解码比到达频率昂贵得多）
//! 2. 解码成图像，成功则交给显示回调
//! 3. 解码失败计数，连续失败超过阈值视为本次连接失效
//!
//! 非 200、EOF、读错误、超过 `idle_timeout` 没有数据或连续解码失败都会结束当前
//! 连接，等待 `reconnect_delay` 后重连。只有致命配置错误（URL 非法）才让泵彻底退出。
//!
//! 视频流与检测轮询完全独立：这里的任何失败都不会影响轮询。

use crate::clock::{CancelToken, Clock};
use crate::error::DriverError;
use crate::metrics::SessionMetrics;
use crate::thread::spawn_named;
use crate::transport::HelmetTransport;
use bytes::Bytes;
use crossbeam_channel::{Sender, after, bounded, select};
use helmet_protocol::{MIN_FRAME_LEN, MjpegDecoder, ServerEndpoint, StreamFrame};
use image::{ImageFormat, RgbImage};
use std::io::{ErrorKind as IoErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 视频流配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// 单次读取的缓冲区大小（默认 8192）
    pub read_buffer_size: usize,
    /// 两次显示之间的最小间隔（默认 500ms）
    pub min_display_interval: Duration,
    /// 允许的最大连续解码失败次数（默认 50，超过即重连）
    pub max_consecutive_decode_failures: u32,
    /// 重连前等待（默认 3s）
    pub reconnect_delay: Duration,
    /// 响应体空闲超时，超过即视为连接失效（默认 10s）
    pub idle_timeout: Duration,
    /// 最小有效帧长度
    pub min_frame_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 8192,
            min_display_interval: Duration::from_millis(500),
            max_consecutive_decode_failures: 50,
            reconnect_delay: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(10),
            min_frame_len: MIN_FRAME_LEN,
        }
    }
}

/// 解码后的一帧
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// 原始 JPEG（便于转发或落盘）
    pub jpeg: Bytes,
    /// RGB 像素
    pub image: Arc<RgbImage>,
}

impl DecodedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 图像解码接口
pub trait FrameCodec: Send + Sync {
    fn decode(&self, frame: &StreamFrame) -> Result<DecodedFrame, DriverError>;
}

/// 基于 `image` crate 的 JPEG 解码器
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl FrameCodec for JpegCodec {
    fn decode(&self, frame: &StreamFrame) -> Result<DecodedFrame, DriverError> {
        let decoded = image::load_from_memory_with_format(frame.as_bytes(), ImageFormat::Jpeg)
            .map_err(|e| DriverError::Decode(e.to_string()))?;
        Ok(DecodedFrame {
            jpeg: frame.clone().into_bytes(),
            image: Arc::new(decoded.to_rgb8()),
        })
    }
}

/// 泵退出原因
#[derive(Debug)]
pub enum StreamExit {
    /// 被取消（stop / 重新配置 / 画面销毁）
    Cancelled,
    /// 致命错误，不再重连
    Fatal(DriverError),
}

/// 单次连接结束原因
#[derive(Debug)]
enum ConnectionEnd {
    Cancelled,
    Eof,
    DecodeFailures(u32),
}

/// 读线程发给泵线程的消息
enum ReadEvent {
    /// 一块数据及其到达时刻
    Data { bytes: Vec<u8>, at: Instant },
    Eof,
    Failed(std::io::Error),
}

/// 读线程主体
///
/// 阻塞读取直到 EOF、读错误或泵线程丢弃接收端。泵线程不等待它结束：
/// 卡在读取上的读线程会在下一次读取返回时发现接收端已断开并退出，
/// 读取器（连同底层连接）随之释放。
fn read_body(
    mut reader: Box<dyn Read + Send>,
    clock: Arc<dyn Clock>,
    buffer_size: usize,
    tx: Sender<ReadEvent>,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let event = match reader.read(&mut buf) {
            Ok(0) => ReadEvent::Eof,
            Ok(n) => ReadEvent::Data {
                bytes: buf[..n].to_vec(),
                at: clock.now(),
            },
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => ReadEvent::Failed(e),
        };
        let last = !matches!(event, ReadEvent::Data { .. });
        if tx.send(event).is_err() || last {
            return;
        }
    }
}

/// 视频流泵
pub struct StreamPump {
    transport: Arc<dyn HelmetTransport>,
    codec: Arc<dyn FrameCodec>,
    clock: Arc<dyn Clock>,
    config: StreamConfig,
    metrics: Arc<SessionMetrics>,
}

impl StreamPump {
    pub fn new(
        transport: Arc<dyn HelmetTransport>,
        codec: Arc<dyn FrameCodec>,
        clock: Arc<dyn Clock>,
        config: StreamConfig,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            transport,
            codec,
            clock,
            config,
            metrics,
        }
    }

    /// 运行直到取消或遇到致命错误
    ///
    /// 每一帧交付前都会检查 `cancel`，取消后不会再有帧到达 `on_frame`。
    pub fn run<F>(&self, endpoint: &ServerEndpoint, cancel: &CancelToken, mut on_frame: F) -> StreamExit
    where
        F: FnMut(DecodedFrame),
    {
        info!("Stream pump started for {}", endpoint.stream_url());

        loop {
            if cancel.is_cancelled() {
                return StreamExit::Cancelled;
            }

            match self.run_connection(endpoint, cancel, &mut on_frame) {
                Ok(ConnectionEnd::Cancelled) => return StreamExit::Cancelled,
                Ok(ConnectionEnd::Eof) => info!("Stream from {} ended", endpoint),
                Ok(ConnectionEnd::DecodeFailures(n)) => {
                    warn!("Stream from {} produced {} undecodable frames in a row", endpoint, n)
                },
                Err(e) if e.is_fatal() => {
                    warn!("Stream pump for {} giving up: {}", endpoint, e);
                    return StreamExit::Fatal(e);
                },
                Err(e) => warn!("Stream from {} failed: {}", endpoint, e),
            }

            debug!(
                "Reconnecting stream in {:?}",
                self.config.reconnect_delay
            );
            if !self.clock.sleep(self.config.reconnect_delay, cancel) {
                return StreamExit::Cancelled;
            }
            self.metrics.stream_reconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn run_connection<F>(
        &self,
        endpoint: &ServerEndpoint,
        cancel: &CancelToken,
        on_frame: &mut F,
    ) -> Result<ConnectionEnd, DriverError>
    where
        F: FnMut(DecodedFrame),
    {
        let reader = self.transport.open_stream(endpoint)?;
        debug!("Stream connected: {}", endpoint.stream_url());

        // 容量 1：读线程最多领先一块，帧的到达时刻贴近读取时刻
        let (tx, chunks) = bounded(1);
        let clock = self.clock.clone();
        let buffer_size = self.config.read_buffer_size.max(1);
        spawn_named("helmet-stream-reader", move || {
            read_body(reader, clock, buffer_size, tx)
        })?;

        // 每个连接一个新解码器，重连即复位
        let mut decoder = MjpegDecoder::with_min_frame_len(self.config.min_frame_len);
        let mut last_displayed: Option<Instant> = None;
        let mut consecutive_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(ConnectionEnd::Cancelled);
            }

            let (bytes, now) = select! {
                recv(chunks) -> event => match event {
                    Ok(ReadEvent::Data { bytes, at }) => (bytes, at),
                    Ok(ReadEvent::Eof) | Err(_) => return Ok(ConnectionEnd::Eof),
                    Ok(ReadEvent::Failed(e)) => return Err(e.into()),
                },
                recv(cancel.receiver()) -> _ => return Ok(ConnectionEnd::Cancelled),
                recv(after(self.config.idle_timeout)) -> _ => {
                    debug!(
                        "No stream data from {} for {:?}",
                        endpoint, self.config.idle_timeout
                    );
                    return Err(DriverError::Timeout {
                        url: endpoint.stream_url(),
                    });
                },
            };

            for frame in decoder.feed(&bytes) {
                self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);

                if let Some(previous) = last_displayed
                    && now.saturating_duration_since(previous) < self.config.min_display_interval
                {
                    self.metrics.frames_rate_limited.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                match self.codec.decode(&frame) {
                    Ok(decoded) => {
                        consecutive_failures = 0;
                        last_displayed = Some(now);
                        if cancel.is_cancelled() {
                            return Ok(ConnectionEnd::Cancelled);
                        }
                        on_frame(decoded);
                        self.metrics.frames_displayed.fetch_add(1, Ordering::Relaxed);
                    },
                    Err(e) => {
                        consecutive_failures += 1;
                        self.metrics.frames_decode_failed.fetch_add(1, Ordering::Relaxed);
                        debug!("Dropping undecodable frame ({} bytes): {}", frame.len(), e);
                        if consecutive_failures > self.config.max_consecutive_decode_failures {
                            return Ok(ConnectionEnd::DecodeFailures(consecutive_failures));
                        }
                    },
                }
            }
        }
    }
}
