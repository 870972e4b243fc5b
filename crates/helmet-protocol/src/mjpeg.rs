//! MJPEG 字节流切帧
//!
//! `/stream` 返回的是连续拼接的 JPEG 图片（服务器实际会夹带 multipart 边界，
//! 但解码器不依赖边界），这里只靠 SOI (`FF D8`) / EOI (`FF D9`) 标记切帧。
//!
//! # 切帧规则
//!
//! - 逐字节扫描，保留 1 字节回看
//! - 遇到 `FF D8`：如果正在累积的旧帧以 `FF D9` 结尾则输出，否则丢弃（截断/损坏帧）；
//!   然后以 `FF D8` 开始新帧
//! - 累积中遇到 `FF D9`：立即输出（不等下一个 SOI，降低延迟）并复位
//! - 长度小于 [`MIN_FRAME_LEN`] 的帧视为噪声丢弃
//!
//! 解码器按连接创建：重连时直接新建一个实例即可复位全部状态。

use bytes::{Bytes, BytesMut};

/// 最小有效帧长度（字节）
pub const MIN_FRAME_LEN: usize = 100;

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;

/// 初始缓冲区容量（640x480 低质量 JPEG 通常 20-40KB）
const INITIAL_CAPACITY: usize = 64 * 1024;

/// 一帧完整的 JPEG 数据（以 `FF D8` 开头、`FF D9` 结尾）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame(Bytes);

impl StreamFrame {
    /// JPEG 原始字节
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 取出底层 `Bytes`（零拷贝）
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// 解码器统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// 输出的完整帧数
    pub frames_emitted: u64,
    /// 因遇到新 SOI 而丢弃的不完整帧数
    pub partial_discarded: u64,
    /// 因过短而丢弃的帧数
    pub noise_discarded: u64,
}

/// MJPEG 切帧器（每个连接一个实例）
#[derive(Debug)]
pub struct MjpegDecoder {
    buffer: BytesMut,
    in_frame: bool,
    last_byte: Option<u8>,
    min_frame_len: usize,
    stats: DecoderStats,
}

impl MjpegDecoder {
    /// 使用默认最小帧长度创建
    pub fn new() -> Self {
        Self::with_min_frame_len(MIN_FRAME_LEN)
    }

    /// 自定义最小帧长度
    pub fn with_min_frame_len(min_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            in_frame: false,
            last_byte: None,
            min_frame_len,
            stats: DecoderStats::default(),
        }
    }

    /// 喂入一段字节，返回惰性的帧迭代器
    ///
    /// 迭代器按顺序产出本段数据中完成的帧。提前丢弃迭代器时，剩余字节仍会被
    /// 扫描（保持解码器状态一致），但其中完成的帧会被丢弃。
    ///
    /// # Example
    ///
    /// ```
    /// use helmet_protocol::MjpegDecoder;
    ///
    /// let mut frame = vec![0xFF, 0xD8];
    /// frame.extend(std::iter::repeat(0x11).take(200));
    /// frame.extend([0xFF, 0xD9]);
    ///
    /// let mut decoder = MjpegDecoder::new();
    /// let (head, tail) = frame.split_at(57);
    /// assert_eq!(decoder.feed(head).count(), 0);
    /// let frames: Vec<_> = decoder.feed(tail).collect();
    /// assert_eq!(frames.len(), 1);
    /// assert_eq!(frames[0].as_bytes(), &frame[..]);
    /// ```
    pub fn feed<'d, 'a>(&'d mut self, data: &'a [u8]) -> Frames<'d, 'a> {
        Frames {
            decoder: self,
            data,
            pos: 0,
        }
    }

    /// 统计快照
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// 当前是否处于帧内
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// 处理单个字节，完成一帧时返回它
    fn push_byte(&mut self, byte: u8) -> Option<StreamFrame> {
        let after_prefix = self.last_byte == Some(MARKER_PREFIX);
        self.last_byte = Some(byte);

        if after_prefix && byte == SOI {
            // EOI 总是立即出帧，所以新 SOI 到来时还在帧内的一定是残帧
            if self.in_frame {
                self.stats.partial_discarded += 1;
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&[MARKER_PREFIX, SOI]);
            self.in_frame = true;
            return None;
        }

        if !self.in_frame {
            return None;
        }

        self.buffer.extend_from_slice(&[byte]);

        if after_prefix && byte == EOI {
            self.in_frame = false;
            let frame = self.buffer.split().freeze();
            return self.accept(frame);
        }

        None
    }

    fn accept(&mut self, frame: Bytes) -> Option<StreamFrame> {
        if frame.len() < self.min_frame_len {
            self.stats.noise_discarded += 1;
            return None;
        }
        self.stats.frames_emitted += 1;
        Some(StreamFrame(frame))
    }
}

impl Default for MjpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// [`MjpegDecoder::feed`] 返回的惰性帧迭代器
pub struct Frames<'d, 'a> {
    decoder: &'d mut MjpegDecoder,
    data: &'a [u8],
    pos: usize,
}

impl Iterator for Frames<'_, '_> {
    type Item = StreamFrame;

    fn next(&mut self) -> Option<StreamFrame> {
        while self.pos < self.data.len() {
            let byte = self.data[self.pos];
            self.pos += 1;
            if let Some(frame) = self.decoder.push_byte(byte) {
                return Some(frame);
            }
        }
        None
    }
}

impl Drop for Frames<'_, '_> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}
