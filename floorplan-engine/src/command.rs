use std::collections::HashMap;

use crate::editor::FloorEditor;
use crate::tool::Tool;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub editor: &'a mut FloorEditor,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(ResetViewportCommand);
        bus.register(ClearSelectionCommand);
        bus.register(DeleteSelectionCommand);
        bus.register(ToggleSnapCommand);
        bus.register(CancelShapeCommand);
        bus.register(SetToolCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

struct ResetViewportCommand;

impl CommandHandler for ResetViewportCommand {
    fn name(&self) -> &'static str {
        "reset_viewport"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.editor.reset_viewport();
        CommandResponse::ok("视口已恢复为完整画布")
    }
}

struct ClearSelectionCommand;

impl CommandHandler for ClearSelectionCommand {
    fn name(&self) -> &'static str {
        "clear_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        context.editor.clear_selection();
        CommandResponse::ok("选中项已清空")
    }
}

struct DeleteSelectionCommand;

impl CommandHandler for DeleteSelectionCommand {
    fn name(&self) -> &'static str {
        "delete_selection"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.editor.delete_selection() {
            Ok(Some(item)) => CommandResponse::ok(format!("已删除 {item:?}")),
            Ok(None) => CommandResponse::err("没有选中的条目"),
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}

struct ToggleSnapCommand;

impl CommandHandler for ToggleSnapCommand {
    fn name(&self) -> &'static str {
        "toggle_snap"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if context.editor.toggle_snap() {
            CommandResponse::ok("网格吸附已开启")
        } else {
            CommandResponse::ok("网格吸附已关闭")
        }
    }
}

struct CancelShapeCommand;

impl CommandHandler for CancelShapeCommand {
    fn name(&self) -> &'static str {
        "cancel_shape"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if context.editor.cancel_shape() {
            CommandResponse::ok("已放弃当前形状")
        } else {
            CommandResponse::ok("没有进行中的形状")
        }
    }
}

struct SetToolCommand;

impl CommandHandler for SetToolCommand {
    fn name(&self) -> &'static str {
        "set_tool"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(name) = request.args.first() else {
            return CommandResponse::err("set_tool 需要工具名参数");
        };
        match name.parse::<Tool>() {
            Ok(tool) => {
                context.editor.set_tool(tool);
                CommandResponse::ok(format!("当前工具: {tool}"))
            }
            Err(err) => CommandResponse::err(err.to_string()),
        }
    }
}
