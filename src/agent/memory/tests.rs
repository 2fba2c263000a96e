use super::*;
use crate::llm::Role;
use crate::llm::fake::{FailingModel, FnModel, ScriptedModel};

#[test]
fn buffer_keeps_everything() {
    let mut memory = ConversationMemory::buffer();
    for i in 0..7 {
        memory.save(&format!("q{i}"), &format!("a{i}"));
    }

    let messages = memory.context_messages();
    assert_eq!(messages.len(), 14);
    assert_eq!(messages[0], Message::user("q0"));
    assert_eq!(messages[13], Message::assistant("a6"));
    assert_eq!(memory.info().exchanges, 7);
}

#[test]
fn window_drops_oldest() {
    let mut memory = ConversationMemory::window(2);
    memory.save("我叫小明", "你好小明");
    memory.save("我喜欢编程", "很好");
    memory.save("我叫什么？", "你叫小明");

    let messages = memory.context_messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].text(), "我喜欢编程");
    assert_eq!(memory.info().exchanges, 2);
    assert_eq!(memory.kind(), MemoryKind::Window);
}

#[test]
fn window_size_zero_is_clamped() {
    let mut memory = ConversationMemory::window(0);
    memory.save("a", "b");
    assert_eq!(memory.info().exchanges, 1);
}

#[test]
fn summary_folds_each_exchange() {
    let model = Arc::new(ScriptedModel::new(vec![
        Message::assistant("用户叫小明"),
        Message::assistant("用户叫小明，喜欢编程"),
    ]));
    let mut memory = ConversationMemory::summary(model.clone());
    assert!(memory.context_messages().is_empty());

    memory.save("我叫小明", "你好");
    memory.save("我喜欢编程", "很好");
    assert_eq!(model.calls(), 2);

    let last_prompt = model.last_prompt();
    assert!(last_prompt[1].text().contains("用户叫小明"));
    assert!(last_prompt[1].text().contains("我喜欢编程"));

    let messages = memory.context_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].text().contains("喜欢编程"));

    let info = memory.info();
    assert_eq!(info.exchanges, 2);
    assert_eq!(info.summary.as_deref(), Some("用户叫小明，喜欢编程"));
}

#[test]
fn summary_falls_back_to_verbatim_on_failure() {
    let mut memory = ConversationMemory::summary(Arc::new(FailingModel));
    memory.save("hi", "hello");
    let info = memory.info();
    assert_eq!(info.summary.as_deref(), Some("用户：hi / AI：hello"));
}

#[test]
fn clear_resets_every_strategy() {
    let mut memories = vec![
        ConversationMemory::buffer(),
        ConversationMemory::window(3),
        ConversationMemory::summary(Arc::new(FnModel(|_: &str| "s".to_string()))),
    ];
    for memory in &mut memories {
        memory.save("q", "a");
        memory.clear();
        let info = memory.info();
        assert_eq!(info.exchanges, 0);
        assert_eq!(info.summary, None);
        assert!(memory.context_messages().is_empty());
    }
}

#[test]
fn from_kind_requires_model_for_summary() {
    assert!(ConversationMemory::from_kind(MemoryKind::Summary, 5, None).is_err());
    let memory =
        ConversationMemory::from_kind(MemoryKind::Window, 3, None).expect("window needs no model");
    assert_eq!(memory.kind(), MemoryKind::Window);
}

#[test]
fn kind_text_forms() {
    assert_eq!(MemoryKind::default(), MemoryKind::Buffer);
    assert_eq!(MemoryKind::Summary.to_string(), "summary");
    let parsed: MemoryKind = serde_json::from_str("\"window\"").expect("parses");
    assert_eq!(parsed, MemoryKind::Window);
}

#[test]
fn info_display() {
    let info = MemoryInfo {
        kind: MemoryKind::Summary,
        exchanges: 3,
        summary: Some("摘要内容".to_string()),
    };
    assert_eq!(info.to_string(), "记忆类型: summary, 对话轮数: 3\n摘要: 摘要内容");
}
