//! DXF 文本格式（组码/值成对出现）解析器。
//!
//! 结构性错误（组码不是整数、段未结束）是致命的；单个实体缺字段或数值无法解析时
//! 只跳过该实体。

use tracing::debug;
use floorplan_core::{
    document::{
        Arc, BlockDefinition, BlockReference, Circle, Dimension, Document, Entity, Line,
        PointEntity, Polyline, PolylineVertex, Text,
    },
    geometry::{Point2, Vector2},
};

#[derive(Debug)]
pub(crate) enum DxfError {
    /// 暂不支持的实体类型，调用方跳过。
    Unsupported { feature: String },
    /// 单个实体字段错误，调用方跳过。
    Malformed { message: String },
    /// 文件结构错误，终止解析。
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub(crate) fn into_message(self) -> String {
        match self {
            DxfError::Unsupported { feature } => feature,
            DxfError::Malformed { message } | DxfError::Invalid { message } => message,
        }
    }
}

pub(crate) struct DxfParser<'a> {
    reader: DxfReader<'a>,
    skipped: usize,
}

impl<'a> DxfParser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            reader: DxfReader::new(source),
            skipped: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Document, DxfError> {
        let mut document = Document::new();
        let mut saw_section = false;
        while let Some((code, value)) = self.reader.next_pair()? {
            if code == 999 {
                continue;
            }
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "意外的组码 {code}（期望 0 表示 SECTION/EOF）"
                )));
            }
            match value.as_str() {
                "SECTION" => {
                    saw_section = true;
                    let (name_code, name) = self
                        .reader
                        .next_pair()?
                        .ok_or_else(|| DxfError::invalid("SECTION 缺少名称（组码 2）"))?;
                    if name_code != 2 {
                        return Err(DxfError::invalid(format!(
                            "SECTION 名称使用了组码 {name_code}（期望 2）"
                        )));
                    }
                    match name.trim() {
                        "ENTITIES" => self.parse_entities(&mut document)?,
                        "BLOCKS" => self.parse_blocks(&mut document)?,
                        _ => self.skip_section()?,
                    }
                }
                "EOF" => break,
                unexpected => {
                    return Err(DxfError::invalid(format!(
                        "意外的标记 {unexpected}，期望 SECTION 或 EOF"
                    )));
                }
            }
        }
        if !saw_section {
            return Err(DxfError::invalid("文件中没有任何 SECTION"));
        }
        if self.skipped > 0 {
            debug!(skipped = self.skipped, "DXF 解析跳过了部分实体");
        }
        Ok(document)
    }

    fn skip_section(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "ENDSEC" => break,
                Some(_) => continue,
                None => {
                    return Err(DxfError::invalid("SECTION 未找到 ENDSEC 终止标记"));
                }
            }
        }
        Ok(())
    }

    fn parse_entities(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("ENTITIES 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "ENTITIES 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                "SEQEND" => self.skip_entity_body()?,
                kind => {
                    if let Some(entity) = self.parse_entity_lenient(kind)? {
                        document.add_entity(entity);
                    }
                }
            }
        }
        Ok(())
    }

    fn parse_blocks(&mut self, document: &mut Document) -> Result<(), DxfError> {
        loop {
            let (code, value) = match self.reader.next_pair()? {
                Some(pair) => pair,
                None => return Err(DxfError::invalid("BLOCKS 段提前结束")),
            };
            if code != 0 {
                return Err(DxfError::invalid(format!(
                    "BLOCKS 段遇到组码 {code}（期望 0 表示实体起始）"
                )));
            }

            match value.as_str() {
                "ENDSEC" => break,
                "BLOCK" => {
                    if let Some(definition) = self.parse_block_definition()? {
                        let name = definition.name.clone();
                        if !document.add_block_definition(definition) {
                            debug!(block = %name, "重复的块定义，保留首次出现的版本");
                        }
                    }
                }
                _ => {
                    // 未预期的条目（例如嵌套记录），直接跳过
                    self.skip_entity_body()?;
                }
            }
        }
        Ok(())
    }

    fn parse_block_definition(&mut self) -> Result<Option<BlockDefinition>, DxfError> {
        let mut name: Option<String> = None;
        let mut base_x: f64 = 0.0;
        let mut base_y: f64 = 0.0;
        let mut collect_entities = true;
        let mut entities: Vec<Entity> = Vec::new();

        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => match value.as_str() {
                    "ENDBLK" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    "SEQEND" => self.skip_entity_body()?,
                    kind => {
                        if collect_entities {
                            if let Some(entity) = self.parse_entity_lenient(kind)? {
                                entities.push(entity);
                            }
                        } else {
                            self.skip_entity_body()?;
                        }
                    }
                },
                Some((code, value)) => match code {
                    2 => {
                        let trimmed = value.trim().to_string();
                        collect_entities = !trimmed.starts_with('*');
                        name = Some(trimmed);
                    }
                    10 => base_x = parse_f64(&value, "BLOCK 基点 X")?,
                    20 => base_y = parse_f64(&value, "BLOCK 基点 Y")?,
                    _ => {}
                },
                None => {
                    return Err(DxfError::invalid("BLOCK 定义未找到 ENDBLK 终止标记"));
                }
            }
        }

        let name = name.ok_or_else(|| DxfError::invalid("BLOCK 缺少名称（组码 2）"))?;
        if !collect_entities {
            return Ok(None);
        }

        Ok(Some(BlockDefinition {
            name,
            base_point: Point2::new(base_x, base_y),
            entities,
        }))
    }

    /// 解析单个实体；不支持或字段错误的实体被跳过并返回 `None`。
    fn parse_entity_lenient(&mut self, kind: &str) -> Result<Option<Entity>, DxfError> {
        match self.parse_entity(kind) {
            Ok(entity) => Ok(Some(entity)),
            Err(err @ (DxfError::Unsupported { .. } | DxfError::Malformed { .. })) => {
                self.skip_entity_body()?;
                self.skipped += 1;
                debug!(kind, reason = %err.into_message(), "跳过实体");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn parse_entity(&mut self, kind: &str) -> Result<Entity, DxfError> {
        match kind {
            "LINE" => self.parse_line(),
            "CIRCLE" => self.parse_circle(),
            "ARC" => self.parse_arc(),
            "LWPOLYLINE" => self.parse_lwpolyline(),
            "POLYLINE" => self.parse_polyline(),
            "INSERT" => self.parse_insert(),
            "TEXT" | "MTEXT" => self.parse_text(kind),
            "DIMENSION" => self.parse_dimension(),
            "POINT" => self.parse_point(),
            other => Err(DxfError::unsupported(format!("暂不支持的实体类型 {other}"))),
        }
    }

    /// 读取实体体内的组码，直到下一个 0 组码（放回缓冲区）。
    fn next_field(&mut self, kind: &str) -> Result<Option<(i32, String)>, DxfError> {
        match self.reader.next_pair()? {
            Some((0, value)) => {
                self.reader.put_back((0, value));
                Ok(None)
            }
            Some(pair) => Ok(Some(pair)),
            None => Err(DxfError::invalid(format!("{kind} 未正确结束"))),
        }
    }

    fn parse_line(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let (mut sx, mut sy, mut ex, mut ey) = (None, None, None, None);
        while let Some((code, value)) = self.next_field("LINE")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                10 => assign_coord(&mut sx, &value, "LINE 起点 X（组码 10）")?,
                20 => assign_coord(&mut sy, &value, "LINE 起点 Y（组码 20）")?,
                11 => assign_coord(&mut ex, &value, "LINE 终点 X（组码 11）")?,
                21 => assign_coord(&mut ey, &value, "LINE 终点 Y（组码 21）")?,
                _ => {}
            }
        }
        Ok(Entity::Line(Line {
            start: Point2::new(
                required(sx, "LINE 缺少起点 X")?,
                required(sy, "LINE 缺少起点 Y")?,
            ),
            end: Point2::new(
                required(ex, "LINE 缺少终点 X")?,
                required(ey, "LINE 缺少终点 Y")?,
            ),
            layer: layer_or_default(layer),
        }))
    }

    fn parse_circle(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let (mut cx, mut cy, mut radius) = (None, None, None);
        while let Some((code, value)) = self.next_field("CIRCLE")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                10 => assign_coord(&mut cx, &value, "CIRCLE 圆心 X（组码 10）")?,
                20 => assign_coord(&mut cy, &value, "CIRCLE 圆心 Y（组码 20）")?,
                40 => assign_coord(&mut radius, &value, "CIRCLE 半径（组码 40）")?,
                _ => {}
            }
        }
        Ok(Entity::Circle(Circle {
            center: Point2::new(
                required(cx, "CIRCLE 缺少圆心 X")?,
                required(cy, "CIRCLE 缺少圆心 Y")?,
            ),
            radius: required(radius, "CIRCLE 缺少半径")?,
            layer: layer_or_default(layer),
        }))
    }

    fn parse_arc(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let (mut cx, mut cy, mut radius) = (None, None, None);
        let (mut start, mut end) = (None, None);
        while let Some((code, value)) = self.next_field("ARC")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                10 => assign_coord(&mut cx, &value, "ARC 圆心 X（组码 10）")?,
                20 => assign_coord(&mut cy, &value, "ARC 圆心 Y（组码 20）")?,
                40 => assign_coord(&mut radius, &value, "ARC 半径（组码 40）")?,
                50 => assign_coord(&mut start, &value, "ARC 起始角（组码 50）")?,
                51 => assign_coord(&mut end, &value, "ARC 终止角（组码 51）")?,
                _ => {}
            }
        }
        Ok(Entity::Arc(Arc {
            center: Point2::new(
                required(cx, "ARC 缺少圆心 X")?,
                required(cy, "ARC 缺少圆心 Y")?,
            ),
            radius: required(radius, "ARC 缺少半径")?,
            start_angle: required(start, "ARC 缺少起始角")?.to_radians(),
            end_angle: required(end, "ARC 缺少终止角")?.to_radians(),
            layer: layer_or_default(layer),
        }))
    }

    fn parse_lwpolyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut is_closed = false;
        let mut vertices: Vec<PolylineVertex> = Vec::new();
        let mut pending_x: Option<f64> = None;
        while let Some((code, value)) = self.next_field("LWPOLYLINE")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                70 => {
                    let flag = parse_i32(&value, "LWPOLYLINE 标志")?;
                    is_closed = flag & 0x01 == 0x01;
                }
                10 => {
                    let x = parse_f64(&value, "LWPOLYLINE 顶点 X")?;
                    if pending_x.replace(x).is_some() {
                        return Err(DxfError::malformed("LWPOLYLINE 顶点缺少对应的 Y（组码 20）"));
                    }
                }
                20 => {
                    let y = parse_f64(&value, "LWPOLYLINE 顶点 Y")?;
                    let x = pending_x
                        .take()
                        .ok_or_else(|| DxfError::malformed("LWPOLYLINE 顶点缺少对应的 X（组码 10）"))?;
                    vertices.push(PolylineVertex::new(Point2::new(x, y)));
                }
                42 => {
                    let bulge = parse_f64(&value, "LWPOLYLINE 顶点 bulge")?;
                    let vertex = vertices.last_mut().ok_or_else(|| {
                        DxfError::malformed("LWPOLYLINE 在定义首个顶点前遇到 bulge（组码 42）")
                    })?;
                    vertex.bulge = bulge;
                }
                _ => {}
            }
        }

        if pending_x.is_some() {
            return Err(DxfError::malformed("LWPOLYLINE 检测到不完整的顶点"));
        }
        if vertices.is_empty() {
            return Err(DxfError::malformed("LWPOLYLINE 未解析到任何顶点"));
        }

        Ok(Entity::Polyline(Polyline {
            vertices,
            is_closed,
            layer: layer_or_default(layer),
        }))
    }

    /// 旧式 POLYLINE：头部之后跟随若干 VERTEX，以 SEQEND 结束。
    fn parse_polyline(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut is_closed = false;
        while let Some((code, value)) = self.next_field("POLYLINE")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                70 => {
                    let flag = parse_i32(&value, "POLYLINE 标志")?;
                    is_closed = flag & 0x01 == 0x01;
                }
                _ => {}
            }
        }

        let mut vertices: Vec<PolylineVertex> = Vec::new();
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) if value == "VERTEX" => {
                    let (mut x, mut y, mut bulge) = (None, None, 0.0);
                    while let Some((code, value)) = self.next_field("VERTEX")? {
                        match code {
                            10 => assign_coord(&mut x, &value, "VERTEX X（组码 10）")?,
                            20 => assign_coord(&mut y, &value, "VERTEX Y（组码 20）")?,
                            42 => bulge = parse_f64(&value, "VERTEX bulge")?,
                            _ => {}
                        }
                    }
                    let position =
                        Point2::new(required(x, "VERTEX 缺少 X")?, required(y, "VERTEX 缺少 Y")?);
                    vertices.push(PolylineVertex::with_bulge(position, bulge));
                }
                Some((0, value)) if value == "SEQEND" => {
                    self.skip_entity_body()?;
                    break;
                }
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => return Err(DxfError::invalid("POLYLINE 缺少 SEQEND")),
            }
        }

        if vertices.is_empty() {
            return Err(DxfError::malformed("POLYLINE 未解析到任何顶点"));
        }
        Ok(Entity::Polyline(Polyline {
            vertices,
            is_closed,
            layer: layer_or_default(layer),
        }))
    }

    fn parse_insert(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let mut name = None;
        let (mut ix, mut iy) = (None, None);
        let mut scale_x: Option<f64> = None;
        let mut scale_y: Option<f64> = None;
        let mut rotation_deg: f64 = 0.0;
        let mut has_attributes = false;

        while let Some((code, value)) = self.next_field("INSERT")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                2 => {
                    if name.is_some() {
                        return Err(DxfError::malformed("INSERT 遇到重复的块名（组码 2）"));
                    }
                    name = Some(value.trim().to_string());
                }
                10 => assign_coord(&mut ix, &value, "INSERT 插入点 X（组码 10）")?,
                20 => assign_coord(&mut iy, &value, "INSERT 插入点 Y（组码 20）")?,
                41 => scale_x = Some(parse_f64(&value, "INSERT 缩放 X")?),
                42 => scale_y = Some(parse_f64(&value, "INSERT 缩放 Y")?),
                50 => rotation_deg = parse_f64(&value, "INSERT 旋转角")?,
                66 => has_attributes = parse_i32(&value, "INSERT 属性标志")? == 1,
                _ => {}
            }
        }

        if has_attributes {
            // 属性文字不参与几何，直接跳到 SEQEND 之后。
            loop {
                match self.reader.next_pair()? {
                    Some((0, value)) if value == "ATTRIB" => self.skip_entity_body()?,
                    Some((0, value)) if value == "SEQEND" => {
                        self.skip_entity_body()?;
                        break;
                    }
                    Some((0, value)) => {
                        self.reader.put_back((0, value));
                        break;
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
        }

        let sx = scale_x.unwrap_or(1.0);
        let sy = scale_y.unwrap_or(sx);
        Ok(Entity::BlockReference(BlockReference {
            name: name.ok_or_else(|| DxfError::malformed("INSERT 缺少块名（组码 2）"))?,
            insert: Point2::new(
                required(ix, "INSERT 缺少插入点 X")?,
                required(iy, "INSERT 缺少插入点 Y")?,
            ),
            scale: Vector2::new(sx, sy),
            rotation: rotation_deg.to_radians(),
            layer: layer_or_default(layer),
        }))
    }

    fn parse_text(&mut self, kind: &str) -> Result<Entity, DxfError> {
        let mut layer = None;
        let (mut x, mut y) = (None, None);
        let mut height = 0.0;
        let mut rotation_deg = 0.0;
        let mut content = String::new();
        while let Some((code, value)) = self.next_field(kind)? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                10 => assign_coord(&mut x, &value, "TEXT 插入点 X（组码 10）")?,
                20 => assign_coord(&mut y, &value, "TEXT 插入点 Y（组码 20）")?,
                40 => height = parse_f64(&value, "TEXT 字高")?,
                50 => rotation_deg = parse_f64(&value, "TEXT 旋转角")?,
                // MTEXT 的长文本以组码 3 分块，组码 1 为最后一块
                1 | 3 => content.push_str(&value),
                _ => {}
            }
        }
        let content = if kind == "MTEXT" {
            decode_mtext_content(&content)
        } else {
            content
        };
        Ok(Entity::Text(Text {
            insert: Point2::new(
                required(x, "TEXT 缺少插入点 X")?,
                required(y, "TEXT 缺少插入点 Y")?,
            ),
            content,
            height,
            rotation: rotation_deg.to_radians(),
            layer: layer_or_default(layer),
        }))
    }

    fn parse_dimension(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let (mut dx, mut dy, mut tx, mut ty) = (None, None, None, None);
        let mut text = None;
        while let Some((code, value)) = self.next_field("DIMENSION")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                10 => assign_coord(&mut dx, &value, "DIMENSION 定义点 X（组码 10）")?,
                20 => assign_coord(&mut dy, &value, "DIMENSION 定义点 Y（组码 20）")?,
                11 => assign_coord(&mut tx, &value, "DIMENSION 文字中点 X（组码 11）")?,
                21 => assign_coord(&mut ty, &value, "DIMENSION 文字中点 Y（组码 21）")?,
                1 => text = Some(value),
                _ => {}
            }
        }
        let definition_point = Point2::new(
            required(dx, "DIMENSION 缺少定义点 X")?,
            required(dy, "DIMENSION 缺少定义点 Y")?,
        );
        let text_midpoint = match (tx, ty) {
            (Some(x), Some(y)) => Point2::new(x, y),
            _ => definition_point,
        };
        Ok(Entity::Dimension(Dimension {
            definition_point,
            text_midpoint,
            text,
            layer: layer_or_default(layer),
        }))
    }

    fn parse_point(&mut self) -> Result<Entity, DxfError> {
        let mut layer = None;
        let (mut x, mut y) = (None, None);
        while let Some((code, value)) = self.next_field("POINT")? {
            match code {
                8 => layer = Some(value.trim().to_string()),
                10 => assign_coord(&mut x, &value, "POINT X（组码 10）")?,
                20 => assign_coord(&mut y, &value, "POINT Y（组码 20）")?,
                _ => {}
            }
        }
        Ok(Entity::Point(PointEntity {
            position: Point2::new(required(x, "POINT 缺少 X")?, required(y, "POINT 缺少 Y")?),
            layer: layer_or_default(layer),
        }))
    }

    fn skip_entity_body(&mut self) -> Result<(), DxfError> {
        loop {
            match self.reader.next_pair()? {
                Some((0, value)) => {
                    self.reader.put_back((0, value));
                    break;
                }
                Some(_) => continue,
                None => break,
            }
        }
        Ok(())
    }
}

struct DxfReader<'a> {
    lines: std::str::Lines<'a>,
    buffer: Option<(i32, String)>,
    line_number: usize,
}

impl<'a> DxfReader<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines(),
            buffer: None,
            line_number: 0,
        }
    }

    fn next_pair(&mut self) -> Result<Option<(i32, String)>, DxfError> {
        if let Some(pair) = self.buffer.take() {
            return Ok(Some(pair));
        }

        let code_line = loop {
            match self.lines.next() {
                Some(line) => {
                    self.line_number += 1;
                    // 文件末尾常见的空行不算作组码
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Ok(None),
            }
        };

        let value_line = match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                line
            }
            None => {
                return Err(DxfError::invalid(format!(
                    "文件在第 {} 行结束，缺少与组码对应的值行",
                    self.line_number
                )));
            }
        };

        let code = code_line.trim().parse::<i32>().map_err(|_| {
            DxfError::invalid(format!(
                "第 {} 行的组码 \"{}\" 无法解析为整数",
                self.line_number - 1,
                code_line.trim()
            ))
        })?;
        let value = value_line.trim_end_matches('\r').trim().to_string();
        Ok(Some((code, value)))
    }

    fn put_back(&mut self, pair: (i32, String)) {
        debug_assert!(self.buffer.is_none(), "内部错误：尝试多次回退 DXF pair");
        self.buffer = Some(pair);
    }
}

fn layer_or_default(layer: Option<String>) -> String {
    layer
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "0".to_string())
}

fn required(value: Option<f64>, message: &str) -> Result<f64, DxfError> {
    value.ok_or_else(|| DxfError::malformed(message))
}

fn assign_coord(slot: &mut Option<f64>, raw: &str, context: &str) -> Result<(), DxfError> {
    if slot.is_some() {
        return Err(DxfError::malformed(format!("{context} 出现重复值")));
    }
    *slot = Some(parse_f64(raw, context)?);
    Ok(())
}

fn parse_f64(raw: &str, context: &str) -> Result<f64, DxfError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| DxfError::malformed(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn parse_i32(raw: &str, context: &str) -> Result<i32, DxfError> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| DxfError::malformed(format!("{context} 解析失败（值：\"{raw}\"）")))
}

fn decode_mtext_content(raw: &str) -> String {
    let mut result = String::new();
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('P') | Some('p') => result.push('\n'),
                Some('~') => result.push(' '),
                Some('\\') => result.push('\\'),
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}
