// 该文件是 Beifeng （北风） 项目的一部分。
// src/keys.rs - 顶点间键值元数据编解码
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

//! # 顶点键值编解码
//!
//! 顶点之间的消息只携带一组有序字符串（keys）和一段二进制负载。
//! 本模块把带类型的键值记录编码为 `key=(type)value` 形式的字符串，
//! 并在下游顶点中解析回来，保留整数、浮点与文本之间的区别。
//!
//! ```
//! use beifeng::{KeyValue, VertexKeys};
//!
//! # fn main() -> Result<(), beifeng::KeyError> {
//! let mut keys = VertexKeys::new();
//! keys.set("frame_idx", 7)?.set("score", KeyValue::float32(0.5))?;
//! assert_eq!(keys.to_keys(), vec!["frame_idx=(int)7", "score=(np.float32)0.5"]);
//!
//! let parsed = VertexKeys::from_keys(keys.to_keys())?;
//! assert_eq!(parsed.get_i64("frame_idx")?, 7);
//! # Ok(())
//! # }
//! ```

mod repr;

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use self::repr::{float_repr, round_to_f16, round_to_f32};

/// 键值编解码错误
///
/// 解析错误携带出错条目的下标与原始文本，便于定位上游顶点的问题。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KeyError {
  #[error("keys[{index}] 必须是 'key=(type)value' 格式，实际包含 {count} 个 '=': {item:?}")]
  SeparatorCount {
    index: usize,
    item: String,
    count: usize,
  },
  #[error("keys[{index}] 键为空: {item:?}")]
  EmptyKey { index: usize, item: String },
  #[error("keys[{index}] 必须包含显式的 (type): {item:?}")]
  MissingType { index: usize, item: String },
  #[error("keys[{index}] 未知类型 '{type_name}'，允许的类型: {allowed}。条目: {item:?}")]
  UnknownType {
    index: usize,
    item: String,
    type_name: String,
    allowed: String,
  },
  #[error("keys[{index}] 无法按类型 {type_name} 解析值 ({reason}): {item:?}")]
  InvalidValue {
    index: usize,
    item: String,
    type_name: String,
    reason: String,
  },
  #[error("keys[{index}] 键 '{key}' 重复: {item:?}")]
  DuplicateKey {
    index: usize,
    item: String,
    key: String,
  },
  #[error("键不存在: {0}")]
  KeyNotFound(String),
  #[error("键 '{key}' 类型不匹配: 期望 {expected}, 实际 {found}")]
  TypeMismatch {
    key: String,
    expected: &'static str,
    found: KeyType,
  },
  #[error("键 '{key}' 无法编码: {reason}")]
  Unrepresentable { key: String, reason: &'static str },
  #[error("键 '{key}' 的值 {value} 超出范围: {expected}")]
  OutOfRange {
    key: String,
    value: i64,
    expected: &'static str,
  },
}

impl KeyError {
  /// 解析错误对应的条目下标
  pub fn index(&self) -> Option<usize> {
    match self {
      KeyError::SeparatorCount { index, .. }
      | KeyError::EmptyKey { index, .. }
      | KeyError::MissingType { index, .. }
      | KeyError::UnknownType { index, .. }
      | KeyError::InvalidValue { index, .. }
      | KeyError::DuplicateKey { index, .. } => Some(*index),
      _ => None,
    }
  }
}

/// 封闭的类型标注集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
  Int,
  NpInt64,
  Float,
  NpFloat16,
  NpFloat32,
  NpFloat64,
  NpLongDouble,
  Str,
}

impl KeyType {
  pub const ALL: [KeyType; 8] = [
    KeyType::Int,
    KeyType::NpInt64,
    KeyType::Float,
    KeyType::NpFloat16,
    KeyType::NpFloat32,
    KeyType::NpFloat64,
    KeyType::NpLongDouble,
    KeyType::Str,
  ];

  pub fn tag(self) -> &'static str {
    match self {
      KeyType::Int => "int",
      KeyType::NpInt64 => "np.int64",
      KeyType::Float => "float",
      KeyType::NpFloat16 => "np.float16",
      KeyType::NpFloat32 => "np.float32",
      KeyType::NpFloat64 => "np.float64",
      KeyType::NpLongDouble => "np.longdouble",
      KeyType::Str => "str",
    }
  }

  pub fn from_tag(tag: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|t| t.tag() == tag)
  }

  pub fn is_integer(self) -> bool {
    matches!(self, KeyType::Int | KeyType::NpInt64)
  }

  pub fn is_float(self) -> bool {
    matches!(
      self,
      KeyType::Float
        | KeyType::NpFloat16
        | KeyType::NpFloat32
        | KeyType::NpFloat64
        | KeyType::NpLongDouble
    )
  }

  fn allowed_tags() -> String {
    let mut tags: Vec<&str> = Self::ALL.iter().map(|t| t.tag()).collect();
    tags.sort_unstable();
    tags.join(", ")
  }
}

impl fmt::Display for KeyType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.tag())
  }
}

/// 带类型标注的标量值
///
/// 变体即类型标注。所有浮点变体在线路上都是双精度文本，
/// 但 `NpFloat16`/`NpFloat32` 的取值会被舍入到声明的精度。
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
  Int(i64),
  NpInt64(i64),
  Float(f64),
  NpFloat16(f64),
  NpFloat32(f64),
  NpFloat64(f64),
  NpLongDouble(f64),
  Str(String),
}

impl KeyValue {
  pub fn float16(value: f64) -> Self {
    KeyValue::NpFloat16(round_to_f16(value))
  }

  pub fn float32(value: f64) -> Self {
    KeyValue::NpFloat32(round_to_f32(value))
  }

  pub fn key_type(&self) -> KeyType {
    match self {
      KeyValue::Int(_) => KeyType::Int,
      KeyValue::NpInt64(_) => KeyType::NpInt64,
      KeyValue::Float(_) => KeyType::Float,
      KeyValue::NpFloat16(_) => KeyType::NpFloat16,
      KeyValue::NpFloat32(_) => KeyType::NpFloat32,
      KeyValue::NpFloat64(_) => KeyType::NpFloat64,
      KeyValue::NpLongDouble(_) => KeyType::NpLongDouble,
      KeyValue::Str(_) => KeyType::Str,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      KeyValue::Int(v) | KeyValue::NpInt64(v) => Some(*v),
      _ => None,
    }
  }

  /// 任意数值变体都可以读作 f64
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      KeyValue::Int(v) | KeyValue::NpInt64(v) => Some(*v as f64),
      KeyValue::Float(v)
      | KeyValue::NpFloat16(v)
      | KeyValue::NpFloat32(v)
      | KeyValue::NpFloat64(v)
      | KeyValue::NpLongDouble(v) => Some(*v),
      KeyValue::Str(_) => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      KeyValue::Str(v) => Some(v),
      _ => None,
    }
  }

  /// 按声明精度舍入
  fn normalized(self) -> Self {
    match self {
      KeyValue::NpFloat16(v) => KeyValue::float16(v),
      KeyValue::NpFloat32(v) => KeyValue::float32(v),
      other => other,
    }
  }

  fn render_value(&self) -> String {
    match self {
      KeyValue::Int(v) | KeyValue::NpInt64(v) => v.to_string(),
      KeyValue::Float(v)
      | KeyValue::NpFloat16(v)
      | KeyValue::NpFloat32(v)
      | KeyValue::NpFloat64(v)
      | KeyValue::NpLongDouble(v) => float_repr(*v),
      KeyValue::Str(v) => v.clone(),
    }
  }

  fn parse_value(key_type: KeyType, text: &str) -> Result<Self, String> {
    let int = |text: &str| text.parse::<i64>().map_err(|e| e.to_string());
    let float = |text: &str| text.parse::<f64>().map_err(|e| e.to_string());
    Ok(match key_type {
      KeyType::Int => KeyValue::Int(int(text)?),
      KeyType::NpInt64 => KeyValue::NpInt64(int(text)?),
      KeyType::Float => KeyValue::Float(float(text)?),
      KeyType::NpFloat16 => KeyValue::float16(float(text)?),
      KeyType::NpFloat32 => KeyValue::float32(float(text)?),
      KeyType::NpFloat64 => KeyValue::NpFloat64(float(text)?),
      KeyType::NpLongDouble => KeyValue::NpLongDouble(float(text)?),
      KeyType::Str => KeyValue::Str(text.to_string()),
    })
  }
}

impl fmt::Display for KeyValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({}){}", self.key_type(), self.render_value())
  }
}

impl From<i64> for KeyValue {
  fn from(value: i64) -> Self {
    KeyValue::Int(value)
  }
}

impl From<i32> for KeyValue {
  fn from(value: i32) -> Self {
    KeyValue::Int(value as i64)
  }
}

impl From<u32> for KeyValue {
  fn from(value: u32) -> Self {
    KeyValue::Int(value as i64)
  }
}

impl From<f64> for KeyValue {
  fn from(value: f64) -> Self {
    KeyValue::Float(value)
  }
}

impl From<f32> for KeyValue {
  fn from(value: f32) -> Self {
    KeyValue::NpFloat32(value as f64)
  }
}

impl From<String> for KeyValue {
  fn from(value: String) -> Self {
    KeyValue::Str(value)
  }
}

impl From<&str> for KeyValue {
  fn from(value: &str) -> Self {
    KeyValue::Str(value.to_string())
  }
}

/// 顶点间传递的键值记录
///
/// 内部以插入顺序保存，覆盖已有键时保持其原有位置。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexKeys {
  entries: IndexMap<String, KeyValue>,
}

impl VertexKeys {
  pub fn new() -> Self {
    Self::default()
  }

  /// 解析 `key=(type)value` 列表，任一条目出错则整体失败
  pub fn from_keys<I, S>(keys: I) -> Result<Self, KeyError>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut entries = IndexMap::new();
    for (index, item) in keys.into_iter().enumerate() {
      let item = item.as_ref();
      let (key, value) = parse_item(index, item)?;
      if entries.contains_key(&key) {
        return Err(KeyError::DuplicateKey {
          index,
          item: item.to_string(),
          key,
        });
      }
      entries.insert(key, value);
    }
    Ok(Self { entries })
  }

  /// 编码为 `key=(type)value` 列表，顺序与插入顺序一致
  pub fn to_keys(&self) -> Vec<String> {
    self
      .entries
      .iter()
      .map(|(key, value)| format!("{}={}", key, value))
      .collect()
  }

  pub fn get(&self, key: &str) -> Result<&KeyValue, KeyError> {
    self
      .entries
      .get(key)
      .ok_or_else(|| KeyError::KeyNotFound(key.to_string()))
  }

  pub fn get_or<'a>(&'a self, key: &str, default: &'a KeyValue) -> &'a KeyValue {
    self.entries.get(key).unwrap_or(default)
  }

  pub fn get_i64(&self, key: &str) -> Result<i64, KeyError> {
    let value = self.get(key)?;
    value.as_i64().ok_or_else(|| KeyError::TypeMismatch {
      key: key.to_string(),
      expected: "integer",
      found: value.key_type(),
    })
  }

  pub fn get_f64(&self, key: &str) -> Result<f64, KeyError> {
    let value = self.get(key)?;
    value.as_f64().ok_or_else(|| KeyError::TypeMismatch {
      key: key.to_string(),
      expected: "number",
      found: value.key_type(),
    })
  }

  pub fn get_str(&self, key: &str) -> Result<&str, KeyError> {
    let value = self.get(key)?;
    value.as_str().ok_or_else(|| KeyError::TypeMismatch {
      key: key.to_string(),
      expected: "str",
      found: value.key_type(),
    })
  }

  pub fn contains(&self, key: &str) -> bool {
    self.entries.contains_key(key)
  }

  /// 插入或覆盖一个键值
  ///
  /// 无法在 `key=(type)value` 语法中无损表示的键或文本值会被拒绝。
  pub fn set(
    &mut self,
    key: impl Into<String>,
    value: impl Into<KeyValue>,
  ) -> Result<&mut Self, KeyError> {
    let key = key.into();
    let value = value.into().normalized();

    if let Some(reason) = unrepresentable_key(&key) {
      return Err(KeyError::Unrepresentable { key, reason });
    }
    if let KeyValue::Str(text) = &value
      && let Some(reason) = unrepresentable_text(text)
    {
      return Err(KeyError::Unrepresentable { key, reason });
    }

    self.entries.insert(key, value);
    Ok(self)
  }

  /// 删除一个键，不存在时什么也不做
  pub fn remove(&mut self, key: &str) -> &mut Self {
    self.entries.shift_remove(key);
    self
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn values(&self) -> impl Iterator<Item = &KeyValue> {
    self.entries.values()
  }
}

impl fmt::Display for VertexKeys {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("{")?;
    for (i, (key, value)) in self.entries.iter().enumerate() {
      if i > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{}: {}", key, value)?;
    }
    f.write_str("}")
  }
}

fn unrepresentable_key(key: &str) -> Option<&'static str> {
  if key.is_empty() {
    Some("键为空")
  } else if key.contains('=') {
    Some("键包含 '='")
  } else if key.trim() != key {
    Some("键包含首尾空白")
  } else {
    None
  }
}

fn unrepresentable_text(text: &str) -> Option<&'static str> {
  if text.contains('=') {
    Some("文本值包含 '='")
  } else if text.trim() != text {
    Some("文本值包含首尾空白")
  } else {
    None
  }
}

fn parse_item(index: usize, item: &str) -> Result<(String, KeyValue), KeyError> {
  let count = item.matches('=').count();
  let Some((key, rest)) = item.split_once('=').filter(|_| count == 1) else {
    return Err(KeyError::SeparatorCount {
      index,
      item: item.to_string(),
      count,
    });
  };

  let key = key.trim();
  if key.is_empty() {
    return Err(KeyError::EmptyKey {
      index,
      item: item.to_string(),
    });
  }

  let Some((type_name, text)) = rest
    .trim()
    .strip_prefix('(')
    .and_then(|body| body.split_once(')'))
  else {
    return Err(KeyError::MissingType {
      index,
      item: item.to_string(),
    });
  };
  let type_name = type_name.trim();

  let key_type = KeyType::from_tag(type_name).ok_or_else(|| KeyError::UnknownType {
    index,
    item: item.to_string(),
    type_name: type_name.to_string(),
    allowed: KeyType::allowed_tags(),
  })?;

  let value =
    KeyValue::parse_value(key_type, text.trim()).map_err(|reason| KeyError::InvalidValue {
      index,
      item: item.to_string(),
      type_name: type_name.to_string(),
      reason,
    })?;

  Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> VertexKeys {
    let mut keys = VertexKeys::new();
    keys
      .set("frame_idx", 12)
      .and_then(|k| k.set("org_height", 2160))
      .and_then(|k| k.set("ratio", 0.3333333333333333))
      .and_then(|k| k.set("box_0_confidence", KeyValue::float32(0.87)))
      .and_then(|k| k.set("box_0_class_id", KeyValue::NpInt64(2)))
      .and_then(|k| k.set("half", KeyValue::float16(0.1)))
      .and_then(|k| k.set("wide", KeyValue::NpLongDouble(1e300)))
      .and_then(|k| k.set("label", "car"))
      .expect("sample keys are representable");
    keys
  }

  #[test]
  fn encodes_tokens_in_insertion_order() {
    let keys = sample();
    assert_eq!(
      keys.to_keys(),
      vec![
        "frame_idx=(int)12",
        "org_height=(int)2160",
        "ratio=(float)0.3333333333333333",
        "box_0_confidence=(np.float32)0.8700000047683716",
        "box_0_class_id=(np.int64)2",
        "half=(np.float16)0.0999755859375",
        "wide=(np.longdouble)1e+300",
        "label=(str)car",
      ]
    );
  }

  #[test]
  fn decode_of_encode_is_identity() {
    let keys = sample();
    let decoded = VertexKeys::from_keys(keys.to_keys()).unwrap();
    assert_eq!(decoded, keys);
    assert_eq!(decoded.to_keys(), keys.to_keys());
  }

  #[test]
  fn decode_tolerates_whitespace_around_parts() {
    let keys = VertexKeys::from_keys([" frame_idx = ( int ) 3 ", "name=(str) cam "]).unwrap();
    assert_eq!(keys.get_i64("frame_idx").unwrap(), 3);
    assert_eq!(keys.get_str("name").unwrap(), "cam");
  }

  #[test]
  fn rejects_wrong_separator_count() {
    let err = VertexKeys::from_keys(["a=(int)1", "b=(str)x=y"]).unwrap_err();
    assert_eq!(
      err,
      KeyError::SeparatorCount {
        index: 1,
        item: "b=(str)x=y".to_string(),
        count: 2
      }
    );
    let err = VertexKeys::from_keys(["no-separator"]).unwrap_err();
    assert_eq!(err.index(), Some(0));
  }

  #[test]
  fn rejects_empty_key_and_missing_type() {
    let err = VertexKeys::from_keys([" =(int)1"]).unwrap_err();
    assert!(matches!(err, KeyError::EmptyKey { index: 0, .. }));

    let err = VertexKeys::from_keys(["a=(int)1", "b=2"]).unwrap_err();
    assert!(matches!(err, KeyError::MissingType { index: 1, .. }));

    let err = VertexKeys::from_keys(["b=(int2"]).unwrap_err();
    assert!(matches!(err, KeyError::MissingType { index: 0, .. }));
  }

  #[test]
  fn rejects_unknown_type_tag() {
    let err = VertexKeys::from_keys(["a=(int)1", "b=(int)2", "c=(np.uint8)3"]).unwrap_err();
    match err {
      KeyError::UnknownType {
        index,
        item,
        type_name,
        allowed,
      } => {
        assert_eq!(index, 2);
        assert_eq!(item, "c=(np.uint8)3");
        assert_eq!(type_name, "np.uint8");
        assert!(allowed.contains("np.float16"));
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn rejects_unparseable_values() {
    let err = VertexKeys::from_keys(["a=(int)1.5"]).unwrap_err();
    assert!(matches!(err, KeyError::InvalidValue { index: 0, .. }));
    let err = VertexKeys::from_keys(["a=(float)abc"]).unwrap_err();
    assert!(matches!(err, KeyError::InvalidValue { index: 0, .. }));
    let err = VertexKeys::from_keys(["a=(int)"]).unwrap_err();
    assert!(matches!(err, KeyError::InvalidValue { index: 0, .. }));
  }

  #[test]
  fn rejects_duplicate_keys() {
    let err = VertexKeys::from_keys(["a=(int)1", "a=(int)2"]).unwrap_err();
    assert!(matches!(err, KeyError::DuplicateKey { index: 1, .. }));
  }

  #[test]
  fn set_rejects_values_outside_the_grammar() {
    let mut keys = VertexKeys::new();
    assert!(matches!(
      keys.set("", 1),
      Err(KeyError::Unrepresentable { .. })
    ));
    assert!(matches!(
      keys.set("a=b", 1),
      Err(KeyError::Unrepresentable { .. })
    ));
    assert!(matches!(
      keys.set("note", "x=y"),
      Err(KeyError::Unrepresentable { .. })
    ));
    assert!(matches!(
      keys.set("note", " padded"),
      Err(KeyError::Unrepresentable { .. })
    ));
    assert!(keys.is_empty());
  }

  #[test]
  fn set_overwrites_in_place_and_remove_is_idempotent() {
    let mut keys = VertexKeys::new();
    keys.set("a", 1).unwrap().set("b", 2).unwrap();
    keys.set("a", "one").unwrap();
    assert_eq!(keys.to_keys(), vec!["a=(str)one", "b=(int)2"]);

    keys.remove("missing").remove("a");
    assert_eq!(keys.to_keys(), vec!["b=(int)2"]);
  }

  #[test]
  fn typed_access() {
    let keys = sample();
    assert_eq!(keys.get_i64("box_0_class_id").unwrap(), 2);
    assert_eq!(keys.get_f64("org_height").unwrap(), 2160.0);
    assert_eq!(
      keys.get_i64("label"),
      Err(KeyError::TypeMismatch {
        key: "label".to_string(),
        expected: "integer",
        found: KeyType::Str
      })
    );
    assert_eq!(
      keys.get("missing"),
      Err(KeyError::KeyNotFound("missing".to_string()))
    );
    let fallback = KeyValue::Int(0);
    assert_eq!(keys.get_or("missing", &fallback), &KeyValue::Int(0));
  }

  #[test]
  fn declared_precision_survives_decode() {
    let keys = VertexKeys::from_keys(["h=(np.float16)0.1", "s=(np.float32)0.1"]).unwrap();
    assert_eq!(keys.get("h").unwrap(), &KeyValue::NpFloat16(0.0999755859375));
    assert_eq!(keys.get("s").unwrap().key_type(), KeyType::NpFloat32);
    assert_eq!(
      keys.to_keys(),
      vec!["h=(np.float16)0.0999755859375", "s=(np.float32)0.10000000149011612"]
    );
  }
}
