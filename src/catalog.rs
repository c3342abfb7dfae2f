//! Static authoring catalog: lesson topics, quest locations and per-topic objectives.
//!
//! Built once at startup and shared read-only. TOML config may append entries.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::CatalogCfg;

/// Selection value meaning "free text supplied separately".
pub const OTHER: &str = "Other";

/// Grade-6 math lessons with their learning objectives, in textbook order.
const TOPIC_OBJECTIVES: &[(&str, &[&str])] = &[
  ("Bài 1: Tập hợp. Phần tử của tập hợp", &["Nhận biết tập hợp và các phần tử", "Mô tả tập hợp bằng cách liệt kê hoặc chỉ ra tính chất đặc trưng", "Sử dụng đúng kí hiệu ∈, ∉"]),
  ("Bài 2: Cách ghi số tự nhiên", &["Đọc và viết số tự nhiên trong hệ thập phân", "Phân biệt số và chữ số", "Biểu diễn số tự nhiên thành tổng giá trị các chữ số"]),
  ("Bài 3: Thứ tự trong tập hợp các số tự nhiên", &["So sánh hai số tự nhiên", "Sắp xếp các số tự nhiên theo thứ tự", "Sử dụng đúng các kí hiệu <, >, ≤, ≥"]),
  ("Bài 4: Phép cộng và phép trừ số tự nhiên", &["Thực hiện thành thạo phép cộng và trừ", "Áp dụng tính chất giao hoán, kết hợp để tính nhanh", "Giải toán thực tế về phép cộng, trừ"]),
  ("Bài 5: Phép nhân và phép chia số tự nhiên", &["Thực hiện thành thạo phép nhân và chia", "Áp dụng tính chất phân phối để tính nhanh", "Giải toán thực tế về phép nhân, chia"]),
  ("Bài 6: Lũy thừa với số mũ tự nhiên", &["Hiểu khái niệm lũy thừa, cơ số, số mũ", "Thực hiện phép tính nâng lên lũy thừa", "Áp dụng các quy tắc nhân, chia hai lũy thừa cùng cơ số"]),
  ("Bài 7: Thứ tự thực hiện các phép tính", &["Nắm vững quy tắc về thứ tự thực hiện các phép tính", "Vận dụng quy tắc để tính đúng giá trị biểu thức", "Giải quyết các bài toán thực tế cần áp dụng thứ tự phép tính"]),
  ("Bài 8: Quan hệ chia hết và tính chất", &["Hiểu khái niệm chia hết, ước và bội", "Áp dụng các tính chất chia hết của một tổng"]),
  ("Bài 9: Dấu hiệu chia hết", &["Nhận biết dấu hiệu chia hết cho 2, 5, 3, 9", "Vận dụng dấu hiệu chia hết để giải toán"]),
  ("Bài 10: Số nguyên tố", &["Phân biệt số nguyên tố và hợp số", "Phân tích một số ra thừa số nguyên tố"]),
  ("Bài 11: Ước chung và ước chung lớn nhất", &["Tìm ước chung và ƯCLN của hai hay nhiều số", "Giải các bài toán thực tế liên quan đến ƯCLN"]),
  ("Bài 12: Bội chung và bội chung nhỏ nhất", &["Tìm bội chung và BCNN của hai hay nhiều số", "Giải các bài toán thực tế liên quan đến BCNN"]),
  ("Bài 13: Tập hợp các số nguyên", &["Nhận biết số nguyên âm, tập hợp số nguyên", "Biểu diễn số nguyên trên trục số", "Tìm số đối của một số nguyên"]),
  ("Bài 14: Thứ tự trong tập hợp các số nguyên", &["So sánh hai số nguyên", "Sắp xếp các số nguyên theo thứ tự"]),
  ("Bài 15: Phép cộng và phép trừ số nguyên", &["Thực hiện thành thạo phép cộng, trừ số nguyên", "Áp dụng các quy tắc và tính chất để tính toán"]),
  ("Bài 16: Phép nhân và phép chia hết hai số nguyên", &["Thực hiện thành thạo phép nhân, chia hai số nguyên", "Vận dụng tính chất phân phối để tính nhanh"]),
  ("Bài 17: Hình tam giác đều. Hình vuông. Hình lục giác đều", &["Nhận dạng các hình tam giác đều, hình vuông, hình lục giác đều", "Mô tả các yếu tố cơ bản (cạnh, góc, đường chéo) của các hình"]),
  ("Bài 18: Hình chữ nhật. Hình thoi", &["Nhận dạng hình chữ nhật, hình thoi", "Vẽ được hình chữ nhật, hình thoi bằng dụng cụ học tập"]),
  ("Bài 19: Hình bình hành. Hình thang cân", &["Nhận dạng hình bình hành, hình thang cân", "Mô tả các yếu tố cơ bản của các hình này"]),
  ("Bài 20: Chu vi và diện tích của một số tứ giác đã học", &["Tính chu vi và diện tích hình vuông, chữ nhật, thoi, bình hành", "Giải các bài toán thực tế liên quan đến chu vi, diện tích"]),
  ("Bài 21: Hình có trục đối xứng", &["Nhận biết trục đối xứng của một hình phẳng", "Tìm các vật thể có trục đối xứng trong thực tế"]),
  ("Bài 22: Hình có tâm đối xứng", &["Nhận biết tâm đối xứng của một hình phẳng", "Tìm các vật thể có tâm đối xứng trong thực tế"]),
  ("Bài 23: Mở rộng khái niệm phân số", &["Hiểu khái niệm phân số với tử và mẫu là số nguyên", "Tìm phân số bằng nhau"]),
  ("Bài 24: So sánh phân số. Hỗn số dương", &["So sánh hai phân số", "Viết phân số dưới dạng hỗn số và ngược lại"]),
  ("Bài 25: Phép cộng và phép trừ phân số", &["Thực hiện thành thạo phép cộng, trừ phân số", "Áp dụng các tính chất để tính nhanh"]),
  ("Bài 26: Phép nhân và phép chia phân số", &["Thực hiện thành thạo phép nhân, chia phân số", "Áp dụng các tính chất để tính hợp lí"]),
  ("Bài 27: Hai bài toán về phân số", &["Giải bài toán tìm giá trị phân số của một số cho trước", "Giải bài toán tìm một số khi biết giá trị phân số của nó"]),
  ("Bài 28: Số thập phân", &["Nhận biết và đọc, viết số thập phân", "Biểu diễn phân số thập phân dưới dạng số thập phân"]),
  ("Bài 29: So sánh hai số thập phân", &["So sánh hai số thập phân (dương và âm)", "Sắp xếp các số thập phân theo thứ tự"]),
  ("Bài 30: Làm tròn và ước lượng", &["Làm tròn số thập phân đến một hàng cho trước", "Ước lượng kết quả các phép tính"]),
  ("Bài 31: Phép cộng và phép trừ số thập phân", &["Thực hiện thành thạo phép cộng và trừ số thập phân", "Giải các bài toán thực tế liên quan"]),
  ("Bài 32: Phép nhân và phép chia số thập phân", &["Thực hiện thành thạo phép nhân và chia số thập phân", "Giải các bài toán thực tế liên quan"]),
  ("Bài 33: Tỉ số. Tỉ số phần trăm", &["Hiểu khái niệm tỉ số và tỉ số phần trăm", "Tính tỉ số và tỉ số phần trăm của hai đại lượng"]),
  ("Bài 34: Hai bài toán về tỉ số phần trăm", &["Giải bài toán tìm giá trị phần trăm của một số", "Giải bài toán tìm một số khi biết giá trị phần trăm của nó"]),
  ("Bài 35: Điểm và đường thẳng", &["Nhận biết điểm, đường thẳng, tia", "Hiểu quan hệ điểm thuộc/không thuộc đường thẳng", "Nhận biết ba điểm thẳng hàng"]),
  ("Bài 36: Góc", &["Nhận biết khái niệm góc, đỉnh, cạnh của góc", "Nhận biết góc bẹt"]),
  ("Bài 37: Số đo góc", &["Sử dụng thước đo góc để đo góc", "So sánh hai góc dựa vào số đo", "Nhận biết góc vuông, nhọn, tù"]),
  ("Bài 38: Dữ liệu và thu thập dữ liệu", &["Phân loại dữ liệu (số liệu, không phải số liệu)", "Thu thập và tổ chức dữ liệu"]),
  ("Bài 39: Bảng thống kê và biểu đồ tranh", &["Đọc và mô tả dữ liệu từ bảng thống kê, biểu đồ tranh", "Biểu diễn dữ liệu vào bảng và biểu đồ tranh"]),
  ("Bài 40: Biểu đồ cột, biểu đồ cột kép", &["Đọc và phân tích dữ liệu từ biểu đồ cột và cột kép", "Vẽ biểu đồ cột và cột kép"]),
  ("Bài 41: Mô hình xác suất trong một số trò chơi và thí nghiệm đơn giản", &["Làm quen với các kết quả có thể xảy ra của một thí nghiệm", "Mô tả các kết quả có thể"]),
  ("Bài 42: Kết quả có thể và sự kiện trong trò chơi, thí nghiệm", &["Phân biệt kết quả có thể và sự kiện", "Kiểm đếm số kết quả thuận lợi cho một sự kiện"]),
  ("Bài 43: Xác suất thực nghiệm", &["Tính xác suất thực nghiệm của một sự kiện", "Sử dụng xác suất thực nghiệm để dự đoán"]),
];

const LOCATIONS: &[&str] = &[
  "Trong lớp học",
  "Ngoài sân trường",
  "Thư viện",
  "Sân thể chất",
  "Cầu thang",
  "Nhà ăn",
  "Cổng trường",
  "Vườn trường",
];

#[derive(Clone, Debug, Serialize)]
pub struct Catalog {
  pub topics: Vec<String>,
  pub locations: Vec<String>,
  pub objectives: HashMap<String, Vec<String>>,
}

impl Catalog {
  pub fn builtin() -> Self {
    let topics = TOPIC_OBJECTIVES.iter().map(|(t, _)| t.to_string()).collect();
    let objectives = TOPIC_OBJECTIVES
      .iter()
      .map(|(t, objs)| (t.to_string(), objs.iter().map(|o| o.to_string()).collect()))
      .collect();
    let locations = LOCATIONS.iter().map(|l| l.to_string()).collect();
    Self { topics, locations, objectives }
  }

  /// Built-in tables plus whatever the config adds. Duplicates are skipped.
  pub fn with_additions(cfg: &CatalogCfg) -> Self {
    let mut cat = Self::builtin();
    for t in &cfg.topics {
      if !cat.topics.contains(t) {
        cat.topics.push(t.clone());
      }
    }
    for l in &cfg.locations {
      if !cat.locations.contains(l) {
        cat.locations.push(l.clone());
      }
    }
    for (topic, objs) in &cfg.objectives {
      let entry = cat.objectives.entry(topic.clone()).or_default();
      for o in objs {
        if !entry.contains(o) {
          entry.push(o.clone());
        }
      }
      if !cat.topics.contains(topic) {
        cat.topics.push(topic.clone());
      }
    }
    cat
  }

  pub fn objectives_for(&self, topic: &str) -> &[String] {
    self.objectives.get(topic).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn default_topic(&self) -> &str {
    self.topics.first().map(String::as_str).unwrap_or(OTHER)
  }

  /// Second location (the schoolyard) when there is one.
  pub fn default_location(&self) -> &str {
    self.locations
      .get(1)
      .or_else(|| self.locations.first())
      .map(String::as_str)
      .unwrap_or(OTHER)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_tables_line_up() {
    let cat = Catalog::builtin();
    assert_eq!(cat.topics.len(), 43);
    assert_eq!(cat.locations.len(), 8);
    for t in &cat.topics {
      assert!(!cat.objectives_for(t).is_empty(), "no objectives for {t}");
    }
    assert_eq!(cat.default_location(), "Ngoài sân trường");
  }

  #[test]
  fn additions_extend_without_duplicates() {
    let mut cfg = CatalogCfg::default();
    cfg.locations = vec!["Thư viện".into(), "Phòng máy".into()];
    cfg.objectives.insert("Bài 36: Góc".into(), vec!["Đo góc trong lớp".into()]);
    let cat = Catalog::with_additions(&cfg);
    assert_eq!(cat.locations.len(), 9);
    assert_eq!(cat.objectives_for("Bài 36: Góc").len(), 3);
    assert!(cat.objectives_for("unknown").is_empty());
  }
}
