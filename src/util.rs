//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// `mm:ss` clock text. Minutes are not wrapped into hours.
pub fn format_clock(total_seconds: u64) -> String {
  let minutes = total_seconds / 60;
  let seconds = total_seconds % 60;
  format!("{:02}:{:02}", minutes, seconds)
}

/// Whole minutes needed to cover `seconds`, rounded up.
pub fn ceil_minutes(seconds: u32) -> u32 {
  seconds.div_ceil(60)
}

/// Log-safe truncation for large strings. Cuts on a char boundary.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn template_replaces_every_key() {
    let out = fill_template("{a} và {b}, rồi {a}", &[("a", "x"), ("b", "y")]);
    assert_eq!(out, "x và y, rồi x");
  }

  #[test]
  fn clock_pads_and_keeps_long_minutes() {
    assert_eq!(format_clock(0), "00:00");
    assert_eq!(format_clock(75), "01:15");
    assert_eq!(format_clock(3600), "60:00");
  }

  #[test]
  fn minutes_round_up() {
    assert_eq!(ceil_minutes(1), 1);
    assert_eq!(ceil_minutes(600), 10);
    assert_eq!(ceil_minutes(601), 11);
  }

  #[test]
  fn truncation_respects_utf8() {
    let s = "Chính xác!";
    let t = trunc_for_log(s, 3);
    assert!(t.starts_with("Ch"));
    assert!(t.contains("bytes total"));
  }
}
