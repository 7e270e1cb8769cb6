// 该文件是 Beifeng （北风） 项目的一部分。
// src/keys/repr.rs - 浮点数文本表示与精度截断
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

// 定点表示的十进制指数范围 [-4, 16)，之外使用科学计数法
const FIXED_EXP_MIN: i32 = -4;
const FIXED_EXP_MAX: i32 = 16;

// 半精度浮点参数
const F16_MIN_EXP: i32 = -14;
const F16_MANTISSA_BITS: i32 = 10;
const F16_OVERFLOW: f64 = 65520.0; // 65504 与 65536 的中点

/// 最短可往返的浮点数文本表示
///
/// 整数值保留 `.0` 后缀，指数超出定点范围时使用带符号、至少两位的指数，
/// 例如 `0.1`、`100.0`、`1e-05`、`1.5e+16`。
pub(crate) fn float_repr(value: f64) -> String {
  if value.is_nan() {
    return "nan".to_string();
  }
  if value.is_infinite() {
    return if value > 0.0 { "inf" } else { "-inf" }.to_string();
  }
  if value == 0.0 {
    return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
  }

  // `{:e}` 输出最短有效数字，例如 "-1.2345e-7"
  let scientific = format!("{:e}", value);
  let (mantissa, exponent) = scientific
    .split_once('e')
    .unwrap_or((scientific.as_str(), "0"));
  let exponent: i32 = exponent.parse().unwrap_or(0);
  let (sign, mantissa) = match mantissa.strip_prefix('-') {
    Some(rest) => ("-", rest),
    None => ("", mantissa),
  };
  let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

  if (FIXED_EXP_MIN..FIXED_EXP_MAX).contains(&exponent) {
    let point = exponent + 1;
    if point <= 0 {
      format!("{}0.{}{}", sign, "0".repeat((-point) as usize), digits)
    } else if point as usize >= digits.len() {
      format!(
        "{}{}{}.0",
        sign,
        digits,
        "0".repeat(point as usize - digits.len())
      )
    } else {
      let (int_part, frac_part) = digits.split_at(point as usize);
      format!("{}{}.{}", sign, int_part, frac_part)
    }
  } else {
    let (head, tail) = digits.split_at(1);
    let exp_sign = if exponent < 0 { '-' } else { '+' };
    if tail.is_empty() {
      format!("{}{}e{}{:02}", sign, head, exp_sign, exponent.abs())
    } else {
      format!("{}{}.{}e{}{:02}", sign, head, tail, exp_sign, exponent.abs())
    }
  }
}

/// 按半精度（binary16）就近偶数舍入，结果仍以 f64 表示
pub(crate) fn round_to_f16(value: f64) -> f64 {
  if !value.is_finite() || value == 0.0 {
    return value;
  }
  let magnitude = value.abs();
  if magnitude >= F16_OVERFLOW {
    return f64::INFINITY.copysign(value);
  }
  if magnitude < f64::MIN_POSITIVE {
    return 0.0f64.copysign(value);
  }

  let exponent = (((magnitude.to_bits() >> 52) & 0x7ff) as i32 - 1023).max(F16_MIN_EXP);
  let quantum = 2f64.powi(exponent - F16_MANTISSA_BITS);
  ((magnitude / quantum).round_ties_even() * quantum).copysign(value)
}

/// 按单精度舍入，结果仍以 f64 表示
pub(crate) fn round_to_f32(value: f64) -> f64 {
  value as f32 as f64
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn renders_like_shortest_repr() {
    assert_eq!(float_repr(0.1), "0.1");
    assert_eq!(float_repr(100.0), "100.0");
    assert_eq!(float_repr(-2.5), "-2.5");
    assert_eq!(float_repr(1234.5), "1234.5");
    assert_eq!(float_repr(0.0001), "0.0001");
    assert_eq!(float_repr(0.00001), "1e-05");
    assert_eq!(float_repr(1.5e-7), "1.5e-07");
    assert_eq!(float_repr(1e15), "1000000000000000.0");
    assert_eq!(float_repr(1e16), "1e+16");
    assert_eq!(float_repr(1.2345678901234568e17), "1.2345678901234568e+17");
    assert_eq!(float_repr(0.0), "0.0");
    assert_eq!(float_repr(-0.0), "-0.0");
    assert_eq!(float_repr(f64::NAN), "nan");
    assert_eq!(float_repr(f64::NEG_INFINITY), "-inf");
  }

  #[test]
  fn rendered_text_parses_back_exactly() {
    for value in [0.1, 1.0 / 3.0, 6.02214076e23, -9.109e-31, 416.0, 0.87654321] {
      let text = float_repr(value);
      assert_eq!(text.parse::<f64>().ok(), Some(value), "{}", text);
    }
  }

  #[test]
  fn half_precision_rounding() {
    assert_eq!(round_to_f16(1.0), 1.0);
    assert_eq!(round_to_f16(0.1), 0.0999755859375);
    assert_eq!(round_to_f16(65519.0), 65504.0);
    assert_eq!(round_to_f16(65520.0), f64::INFINITY);
    assert_eq!(round_to_f16(-1e-9), 0.0);
    assert!(round_to_f16(-1e-9).is_sign_negative());
    // 次正规数区间
    assert_eq!(round_to_f16(2f64.powi(-24)), 2f64.powi(-24));
  }

  #[test]
  fn single_precision_rounding() {
    assert_eq!(round_to_f32(0.1), 0.10000000149011612);
    assert_eq!(float_repr(round_to_f32(0.5)), "0.5");
  }
}
