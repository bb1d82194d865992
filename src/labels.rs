//! Character-detector class labels.
//!
//! The character model emits compact class names: digits as themselves,
//! consonants as `A01`..`A44`, provinces as three-letter codes. This module
//! maps them to the glyphs and names printed on Thai plates.

use std::collections::HashMap;
use std::sync::OnceLock;

const DIGITS: &[(&str, &str)] = &[
    ("0", "0"),
    ("1", "1"),
    ("2", "2"),
    ("3", "3"),
    ("4", "4"),
    ("5", "5"),
    ("6", "6"),
    ("7", "7"),
    ("8", "8"),
    ("9", "9"),
];

const CONSONANTS: &[(&str, &str)] = &[
    ("A01", "ก"),
    ("A02", "ข"),
    ("A03", "ฃ"),
    ("A04", "ค"),
    ("A05", "ฅ"),
    ("A06", "ฆ"),
    ("A07", "ง"),
    ("A08", "จ"),
    ("A09", "ฉ"),
    ("A10", "ช"),
    ("A11", "ซ"),
    ("A12", "ฌ"),
    ("A13", "ญ"),
    ("A14", "ฎ"),
    ("A15", "ฏ"),
    ("A16", "ฐ"),
    ("A17", "ฑ"),
    ("A18", "ฒ"),
    ("A19", "ณ"),
    ("A20", "ด"),
    ("A21", "ต"),
    ("A22", "ถ"),
    ("A23", "ท"),
    ("A24", "ธ"),
    ("A25", "น"),
    ("A26", "บ"),
    ("A27", "ป"),
    ("A28", "ผ"),
    ("A29", "ฝ"),
    ("A30", "พ"),
    ("A31", "ฟ"),
    ("A32", "ภ"),
    ("A33", "ม"),
    ("A34", "ย"),
    ("A35", "ร"),
    ("A36", "ล"),
    ("A37", "ว"),
    ("A38", "ศ"),
    ("A39", "ษ"),
    ("A40", "ส"),
    ("A41", "ห"),
    ("A42", "ฬ"),
    ("A43", "อ"),
    ("A44", "ฮ"),
];

const PROVINCES: &[(&str, &str)] = &[
    ("ACR", "อำนาจเจริญ"),
    ("ATG", "อ่างทอง"),
    ("AYA", "พระนครศรีอยุธยา"),
    ("BKK", "กรุงเทพมหานคร"),
    ("BKN", "บึงกาฬ"),
    ("BRM", "บุรีรัมย์"),
    ("BTG", "เบตง"),
    ("CBI", "ชลบุรี"),
    ("CCO", "ฉะเชิงเทรา"),
    ("CMI", "เชียงใหม่"),
    ("CNT", "ชัยนาท"),
    ("CPM", "ชัยภูมิ"),
    ("CPN", "ชุมพร"),
    ("CRI", "เชียงราย"),
    ("CTI", "จันทบุรี"),
    ("KBI", "กระบี่"),
    ("KKN", "ขอนแก่น"),
    ("KPT", "กำแพงเพชร"),
    ("KRI", "กาญจนบุรี"),
    ("KSN", "กาฬสินธุ์"),
    ("LEI", "เลย"),
    ("LPG", "ลำปาง"),
    ("LPN", "ลำพูน"),
    ("LRI", "ลพบุรี"),
    ("MDH", "มุกดาหาร"),
    ("MKM", "มหาสารคาม"),
    ("MSN", "แม่ฮ่องสอน"),
    ("NAN", "น่าน"),
    ("NBI", "นนทบุรี"),
    ("NBP", "หนองบัวลำภู"),
    ("NKI", "หนองคาย"),
    ("NMA", "นครราชสีมา"),
    ("NPM", "นครพนม"),
    ("NPT", "นครปฐม"),
    ("NSN", "นครสวรรค์"),
    ("NST", "นครศรีธรรมราช"),
    ("NYK", "นครนายก"),
    ("PBI", "ปราจีนบุรี"),
    ("PCT", "พิจิตร"),
    ("PKN", "ประจวบคีรีขันธ์"),
    ("PKT", "ภูเก็ต"),
    ("PLG", "พัทลุง"),
    ("PLK", "พิษณุโลก"),
    ("PNA", "พังงา"),
    ("PNB", "เพชรบูรณ์"),
    ("PRE", "แพร่"),
    ("PRI", "เพชรบุรี"),
    ("PTE", "ปทุมธานี"),
    ("PTN", "ปัตตานี"),
    ("PYO", "พะเยา"),
    ("RBR", "ราชบุรี"),
    ("RET", "ร้อยเอ็ด"),
    ("RNG", "ระนอง"),
    ("RYG", "ระยอง"),
    ("SBR", "สระบุรี"),
    ("SKA", "สงขลา"),
    ("SKM", "สมุทรสงคราม"),
    ("SKN", "สมุทรสาคร"),
    ("SKW", "สระแก้ว"),
    ("SNI", "สิงห์บุรี"),
    ("SNK", "สกลนคร"),
    ("SPB", "สุพรรณบุรี"),
    ("SPK", "สมุทรปราการ"),
    ("SRI", "สุราษฎร์ธานี"),
    ("SRN", "สุรินทร์"),
    ("SSK", "ศรีสะเกษ"),
    ("STI", "สุโขทัย"),
    ("TAK", "ตาก"),
    ("TRG", "ตรัง"),
    ("TRT", "ตราด"),
    ("UBN", "อุบลราชธานี"),
    ("UDN", "อุดรธานี"),
    ("UTI", "อุทัยธานี"),
    ("UTT", "อุตรดิตถ์"),
    ("YLA", "ยะลา"),
    ("YST", "ยโสธร"),
];

fn table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        DIGITS
            .iter()
            .chain(CONSONANTS)
            .chain(PROVINCES)
            .copied()
            .collect()
    })
}

/// Decode a raw class label. Unknown labels pass through unchanged.
pub fn decode_label(raw: &str) -> &str {
    table().get(raw).copied().unwrap_or(raw)
}

/// All known raw labels, in table order (digits, consonants, provinces).
pub fn known_labels() -> impl Iterator<Item = &'static str> {
    DIGITS
        .iter()
        .chain(CONSONANTS)
        .chain(PROVINCES)
        .map(|(raw, _)| *raw)
}
