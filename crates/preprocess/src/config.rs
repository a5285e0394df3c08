/// Square input expected by YOLOv5-family exports.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Grey used by YOLO letterboxing.
pub const LETTERBOX_COLOR: u8 = 114;
