//! # 报警提示音
//!
//! 每种提示音对应一个循环振动模式，报警期间声音和振动同步循环，
//! 报警结束时一起停止。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 提示音
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertTone {
    #[default]
    DefaultBeep,
    HighPitchAlert,
    LowPitchWarning,
    PulseAlert,
    ContinuousBeep,
    EmergencySiren,
}

impl AlertTone {
    /// 全部提示音（设置界面展示顺序）
    pub const ALL: [AlertTone; 6] = [
        AlertTone::DefaultBeep,
        AlertTone::HighPitchAlert,
        AlertTone::LowPitchWarning,
        AlertTone::PulseAlert,
        AlertTone::ContinuousBeep,
        AlertTone::EmergencySiren,
    ];

    /// 展示名称
    pub fn display_name(self) -> &'static str {
        match self {
            AlertTone::DefaultBeep => "Default Beep",
            AlertTone::HighPitchAlert => "High Pitch Alert",
            AlertTone::LowPitchWarning => "Low Pitch Warning",
            AlertTone::PulseAlert => "Pulse Alert",
            AlertTone::ContinuousBeep => "Continuous Beep",
            AlertTone::EmergencySiren => "Emergency Siren",
        }
    }

    /// 配置文件中使用的标识
    pub fn key(self) -> &'static str {
        match self {
            AlertTone::DefaultBeep => "default-beep",
            AlertTone::HighPitchAlert => "high-pitch-alert",
            AlertTone::LowPitchWarning => "low-pitch-warning",
            AlertTone::PulseAlert => "pulse-alert",
            AlertTone::ContinuousBeep => "continuous-beep",
            AlertTone::EmergencySiren => "emergency-siren",
        }
    }

    /// 与提示音同步的振动模式
    pub fn vibration(self) -> VibrationPattern {
        match self {
            // 400ms 振动，200ms 停
            AlertTone::PulseAlert => VibrationPattern {
                timings_ms: &[0, 400, 200],
                amplitudes: &[Some(0), None, Some(0)],
            },
            // 几乎连续，50ms 间隙刷新
            AlertTone::ContinuousBeep => VibrationPattern {
                timings_ms: &[0, 800, 50],
                amplitudes: &[Some(0), None, Some(0)],
            },
            // 强弱交替的短脉冲
            AlertTone::EmergencySiren => VibrationPattern {
                timings_ms: &[0, 300, 150, 300, 150],
                amplitudes: &[Some(0), Some(255), Some(0), Some(200), Some(0)],
            },
            AlertTone::DefaultBeep | AlertTone::HighPitchAlert | AlertTone::LowPitchWarning => {
                VibrationPattern {
                    timings_ms: &[0, 500, 500],
                    amplitudes: &[Some(0), None, Some(0)],
                }
            },
        }
    }
}

impl fmt::Display for AlertTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 未知提示音名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTone(pub String);

impl fmt::Display for UnknownTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown alert tone '{}'", self.0)
    }
}

impl std::error::Error for UnknownTone {}

impl FromStr for AlertTone {
    type Err = UnknownTone;

    /// 同时接受配置标识（`emergency-siren`）和展示名称（`Emergency Siren`），
    /// 不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        AlertTone::ALL
            .into_iter()
            .find(|tone| tone.key() == normalized)
            .ok_or_else(|| UnknownTone(s.to_string()))
    }
}

/// 循环振动模式
///
/// `timings_ms` 为交替的"停/振"时长（第一个值是起始延迟），
/// `amplitudes` 与之一一对应：`None` 表示设备默认强度，`Some(0)` 表示不振动。
/// 整个模式从第 0 项开始循环，直到报警结束。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VibrationPattern {
    pub timings_ms: &'static [u64],
    pub amplitudes: &'static [Option<u8>],
}

impl VibrationPattern {
    /// 一个循环的总时长
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.timings_ms.iter().sum())
    }

    /// 按 (时长, 是否振动) 迭代一个循环，跳过零时长片段
    pub fn segments(&self) -> impl Iterator<Item = (Duration, bool)> + '_ {
        self.timings_ms
            .iter()
            .zip(self.amplitudes.iter())
            .filter(|(ms, _)| **ms > 0)
            .map(|(ms, amp)| (Duration::from_millis(*ms), *amp != Some(0)))
    }
}
