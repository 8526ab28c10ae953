// src/services/prompts.rs
//
// Pure text templating for the external editing step. The instruction
// wording matters less than the format contract: the editor must keep every
// `### 【标题】` marker intact or backfill cannot re-map the result.

use serde::{Deserialize, Serialize};

/// Which reader perspective the external rewrite should target.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationTarget {
    #[serde(rename = "BL")]
    Bl,
    #[serde(rename = "BG")]
    Bg,
}

pub const BL_PROMPT: &str = "【指令】：你是一个专业的角色卡改写助手。请读取下方的角色卡数据，并执行以下修改任务：\n\
1. 【核心任务】：将User的性别设定为【男性】，将指代User的代词统一改为\"他\"，并相应调整互动描写的视角与称谓。\n\
2. 【格式死命令】：\n\
   - 严禁删除换行符！严禁合并段落！\n\
   - 严禁修改 XML 标签（如 <tag>）和列表符号。\n\
   - 【重要】必须保留所有 ### 【标题】 格式，这是回填识别的关键！\n\
   - 请按顺序输出修改后的内容。";

pub const BG_PROMPT: &str = "【指令】：你是一个专业的角色卡改写助手。请读取下方的角色卡数据，并执行以下修改任务：\n\
1. 【核心任务】：将User的性别设定为【女性】，将指代User的代词统一改为\"她\"，并相应调整互动描写的视角与称谓。\n\
2. 【格式死命令】：\n\
   - 严禁删除换行符！严禁合并段落！\n\
   - 严禁修改 XML 标签（如 <tag>）和列表符号。\n\
   - 【重要】必须保留所有 ### 【标题】 格式，这是回填识别的关键！\n\
   - 请按顺序输出修改后的内容。";

/// Instruction preamble plus the work unit's content, separated by a rule.
pub fn build_conversion_prompt(target: OrientationTarget, content: &str) -> String {
    let base = match target {
        OrientationTarget::Bl => BL_PROMPT,
        OrientationTarget::Bg => BG_PROMPT,
    };
    format!("{base}\n\n---\n\n{content}")
}
