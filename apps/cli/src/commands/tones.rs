//! 提示音列表命令

use anyhow::Result;
use clap::Args;
use helmet_sdk::tools::AlertTone;

/// 提示音列表参数
#[derive(Args, Debug)]
pub struct TonesCommand {
    /// 同时显示振动模式
    #[arg(short, long)]
    pub vibration: bool,
}

impl TonesCommand {
    pub fn execute(&self) -> Result<()> {
        println!("可用提示音（alert.tone）:");
        for tone in AlertTone::ALL {
            println!("  {:<20} {}", tone.key(), tone.display_name());
            if self.vibration {
                println!("      {}", describe_pattern(tone));
            }
        }
        Ok(())
    }
}

/// 例如 `400ms on, 200ms off (cycle 600ms)`
fn describe_pattern(tone: AlertTone) -> String {
    let pattern = tone.vibration();
    let segments: Vec<String> = pattern
        .segments()
        .map(|(duration, on)| {
            format!("{}ms {}", duration.as_millis(), if on { "on" } else { "off" })
        })
        .collect();
    format!(
        "{} (cycle {}ms)",
        segments.join(", "),
        pattern.cycle().as_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_pulse_pattern() {
        assert_eq!(
            describe_pattern(AlertTone::PulseAlert),
            "400ms on, 200ms off (cycle 600ms)"
        );
    }

    #[test]
    fn test_describe_siren_pattern() {
        assert_eq!(
            describe_pattern(AlertTone::EmergencySiren),
            "300ms on, 150ms off, 300ms on, 150ms off (cycle 900ms)"
        );
    }
}
