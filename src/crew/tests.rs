use super::*;
use crate::llm::fake::{FailingModel, FnModel, ScriptedModel};
use crate::llm::{Message, Role, ToolCall};

fn user_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text().to_string())
        .unwrap_or_default()
}

#[test]
fn kickoff_passes_earlier_outputs_as_context() {
    let model = Arc::new(FnModel(|prompt: &str| {
        if prompt.contains("[任务 1 - 研究员]") {
            "基于研究写成的文章".to_string()
        } else {
            "研究笔记".to_string()
        }
    }));
    let crew = Crew::new(model)
        .with_agent(CrewAgent::new("研究员", "研究", "经验丰富"))
        .with_agent(CrewAgent::new("作者", "写作", "文笔好"));
    let tasks = vec![
        CrewTask::new("研究 Rust", "研究报告", "研究员"),
        CrewTask::new("写文章", "一篇文章", "作者"),
    ];

    let output = crew.kickoff(&tasks).expect("crew runs");
    assert_eq!(output.tasks.len(), 2);
    assert_eq!(output.tasks[0].output, "研究笔记");
    assert_eq!(output.tasks[1].agent_role, "作者");
    assert_eq!(output.final_output, "基于研究写成的文章");
}

#[test]
fn each_member_gets_its_persona_and_task() {
    let model = Arc::new(ScriptedModel::new(Vec::new()).with_fallback("完成"));
    let crew = Crew::new(Arc::clone(&model) as Arc<dyn ChatModel>)
        .with_agent(CrewAgent::new("分析师", "找出问题", "严谨"));
    crew.kickoff(&[CrewTask::new("分析文章", "分析报告", "分析师")])
        .expect("crew runs");

    let messages = model.last_prompt();
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].text().starts_with("你是分析师。"));
    assert!(messages[0].text().contains("你的目标：找出问题"));

    let prompt = user_prompt(&messages);
    assert!(prompt.contains("任务描述：\n分析文章"));
    assert!(prompt.contains("期望输出：分析报告"));
    assert!(!prompt.contains("前序任务"));
}

#[test]
fn members_use_their_own_tools() {
    let model = Arc::new(
        ScriptedModel::new(vec![
            Message::assistant_tool_calls(vec![ToolCall::new(
                "call_1",
                "search_tool",
                r#"{"query":"机器学习"}"#,
            )]),
            Message::assistant("研究完成"),
        ])
        .with_fallback("写作完成"),
    );
    let (crew, tasks) =
        Crew::research_writing(Arc::clone(&model) as Arc<dyn ChatModel>, "机器学习", DEFAULT_ARTICLE_TYPE);

    let output = crew.kickoff(&tasks).expect("crew runs");
    assert_eq!(output.tasks.len(), 4);

    let research = &output.tasks[0];
    assert_eq!(research.agent_role, RESEARCHER);
    assert_eq!(research.output, "研究完成");
    assert_eq!(research.steps.len(), 1);
    assert_eq!(research.steps[0].tool, "search_tool");
    assert!(research.steps[0].output.starts_with("搜索结果：机器学习是人工智能的一个子集"));

    assert_eq!(output.final_output, "写作完成");
    assert_eq!(output.tasks[3].agent_role, COORDINATOR);
    // research reply, follow-up, then one call for each later member
    assert_eq!(model.calls(), 5);
}

#[test]
fn research_writing_builds_four_members() {
    let (crew, tasks) = Crew::research_writing(Arc::new(FailingModel), "Rust", "教程");
    let roles: Vec<&str> = crew.agents().iter().map(|a| a.role.as_str()).collect();
    assert_eq!(roles, vec![RESEARCHER, WRITER, ANALYST, COORDINATOR]);

    let task_roles: Vec<&str> = tasks.iter().map(|t| t.agent_role.as_str()).collect();
    assert_eq!(task_roles, roles);
    assert!(tasks[0].description.contains("\"Rust\""));
    assert!(tasks[1].description.contains("的教程"));

    let info = crew.agent_info();
    assert!(info.contains("🔹 资深研究员"));
    assert!(info.contains("工具：search_tool"));
    assert!(info.contains("工具：analysis_tool"));
    assert!(info.contains("可委派：是"));
}

#[test]
fn unknown_role_fails_before_any_model_call() {
    let model = Arc::new(ScriptedModel::new(Vec::new()));
    let crew = Crew::new(Arc::clone(&model) as Arc<dyn ChatModel>)
        .with_agent(CrewAgent::new("作者", "写作", "文笔好"));
    let err = crew
        .kickoff(&[
            CrewTask::new("写", "文章", "作者"),
            CrewTask::new("审", "意见", "编辑"),
        ])
        .expect_err("missing member");
    assert!(matches!(err, LabError::Config(ref m) if m.contains("编辑")));
    assert_eq!(model.calls(), 0);
}

#[test]
fn empty_task_list_is_rejected() {
    let crew = Crew::new(Arc::new(FailingModel));
    assert!(crew.kickoff(&[]).is_err());
}

#[test]
fn model_failure_stops_the_crew() {
    let (crew, tasks) = Crew::research_writing(Arc::new(FailingModel), "AI", DEFAULT_ARTICLE_TYPE);
    let err = crew.kickoff(&tasks).expect_err("model fails");
    assert!(matches!(err, LabError::Llm(_)));
}

#[test]
fn report_shows_tool_calls_and_final_result() {
    let output = CrewOutput {
        tasks: vec![TaskOutput {
            agent_role: ANALYST.to_string(),
            description: "分析".to_string(),
            output: "评分 8".to_string(),
            steps: vec![AgentStep {
                tool: "analysis_tool".to_string(),
                input: "文本".to_string(),
                output: "文本分析结果".to_string(),
            }],
        }],
        final_output: "评分 8".to_string(),
    };
    let report = output.report();
    assert!(report.starts_with("🔸 任务 1 - 内容质量分析师\n"));
    assert!(report.contains("  🔧 analysis_tool(文本) → 文本分析结果"));
    assert!(report.ends_with("✅ 最终结果：\n评分 8"));
}

#[test]
fn topic_search_matches_keywords() {
    assert!(tools::topic_search("什么是langchain").starts_with("搜索结果：LangChain是"));
    assert_eq!(
        tools::topic_search("量子计算"),
        "关于'量子计算'的搜索结果：这是一个相关的技术主题，需要进一步研究。"
    );
}

#[test]
fn analyze_text_counts_and_grades() {
    let report = tools::analyze_text("AI agents\n use tools");
    assert!(report.contains("- 字数：4 词"));
    assert!(report.contains("- 字符数：20 字符"));
    assert!(report.contains("- 行数：2 行"));
    assert!(report.contains("- 技术关键词：Agent, AI"));
    assert!(report.contains("- 内容质量：高质量技术内容"));

    let plain = tools::analyze_text("hello");
    assert!(plain.contains("- 技术关键词：无"));
    assert!(plain.contains("- 内容质量：需要更多技术细节"));
}
