use super::*;
use crate::test_support::ScriptedChat;

#[tokio::test]
async fn rewrite_uses_fixed_prompt_at_temperature_zero() {
    let model = Arc::new(ScriptedChat::replying("office opening hours Friday"));
    let rewriter = QueryRewriter::new(Arc::clone(&model) as Arc<dyn ChatModel>);

    let query = rewriter
        .rewrite("Is the office open on Friday?")
        .await
        .expect("should rewrite");

    assert_eq!(query, "office opening hours Friday");
    let requests = model.requests.lock().expect("should lock");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].temperature, 0.0);
    let prompt = requests[0].prompt_text();
    assert!(prompt.contains("User Question: Is the office open on Friday?"));
    assert!(prompt.contains("Do not answer the question"));
}

#[tokio::test]
async fn label_and_quotes_are_stripped() {
    let rewriter = QueryRewriter::new(Arc::new(ScriptedChat::replying(
        "  Search Query: \"remote work policy\"\n",
    )));

    let query = rewriter.rewrite("can I work from home").await.expect("should rewrite");
    assert_eq!(query, "remote work policy");
}

#[tokio::test]
async fn empty_response_is_a_generation_error() {
    let rewriter = QueryRewriter::new(Arc::new(ScriptedChat::replying("  \n\"\"  ")));

    let result = rewriter.rewrite("anything").await;
    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[tokio::test]
async fn model_failure_is_a_generation_error() {
    let rewriter = QueryRewriter::new(Arc::new(ScriptedChat::failing()));

    let result = rewriter.rewrite("anything").await;
    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[test]
fn clean_rewrite_keeps_plain_queries() {
    assert_eq!(clean_rewrite("vacation days"), "vacation days");
    assert_eq!(clean_rewrite("'parking'"), "parking");
    assert_eq!(clean_rewrite("SEARCH QUERY: benefits"), "benefits");
    assert_eq!(clean_rewrite("\"unbalanced"), "\"unbalanced");
    assert_eq!(clean_rewrite("Überstunden Regelung"), "Überstunden Regelung");
}
