//! End-to-end engine scenarios against scripted transports

#[cfg(test)]
mod tests {
    use crate::{Engine, EngineConfig, EngineError, PromptBuilder, MAX_FILENAME_CHARS};
    use rns_domain::{
        Decision, FailureKind, FileDescriptor, FileMetadata, RenameRequest, SortRequest,
        StemAction, Task, Transport, TransportError,
    };
    use rns_llm::MockTransport;

    const VALID_RENAME: &str = "<new_name>Acme_Invoice.pdf</new_name><reason>invoice</reason>";

    fn engine<'a>(transports: &[&'a MockTransport]) -> Engine<'a> {
        Engine::new(transports.iter().map(|t| *t as &dyn Transport).collect())
    }

    fn pdf() -> FileMetadata {
        FileMetadata::with_extension("pdf")
            .title("Invoice from Acme")
            .summary("Invoice for office supplies, January 2024")
    }

    fn descriptor() -> FileDescriptor {
        FileDescriptor {
            path: "/inbox/photo.png".to_string(),
            name: "photo.png".to_string(),
            extension: "png".to_string(),
            description: "a beach at sunset".to_string(),
        }
    }

    #[test]
    fn test_parse_retry_then_fallback() {
        let a = MockTransport::with_responses("a", ["not xml", "still bad"]);
        let b = MockTransport::with_responses("b", [VALID_RENAME]);

        let result = engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap();

        assert_eq!(result.new_name, "Acme_Invoice.pdf");
        assert_eq!(result.reason, "invoice");
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 1);

        let a_calls = a.calls();
        assert_eq!(a_calls[0].purpose, "rename");
        assert_eq!(a_calls[1].purpose, "rename (format fix)");
        assert!(b.calls()[0].purpose.to_lowercase().contains("format fix"));
    }

    #[test]
    fn test_guardrail_exhaustion_then_fallback() {
        let a = MockTransport::failing("a", TransportError::GuardrailViolation("refused".into()));
        let b = MockTransport::with_responses("b", [VALID_RENAME]);
        let req = RenameRequest::new("old.pdf", pdf());
        let builder = PromptBuilder::default();

        let result = engine(&[&a, &b]).run_rename(&req).unwrap();

        assert_eq!(result.new_name, "Acme_Invoice.pdf");
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 1);

        let a_calls = a.calls();
        assert_eq!(a_calls[0].prompt, builder.rename(&req));
        assert_eq!(a_calls[1].prompt, builder.rename_minimal(&req));
        assert_eq!(a_calls[1].purpose, "rename");
        assert_eq!(b.calls()[0].prompt, builder.rename(&req));
        assert_eq!(b.calls()[0].purpose, "rename");
    }

    #[test]
    fn test_minimal_prompt_differs_from_full() {
        let a = MockTransport::failing("a", TransportError::GuardrailViolation("refused".into()));

        let _ = engine(&[&a]).rename("old.pdf", &pdf());

        let calls = a.calls();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].prompt, calls[1].prompt);
        assert!(calls[1].prompt.contains("excerpt:"));
    }

    #[test]
    fn test_last_transport_error_surfaces() {
        let a = MockTransport::with_responses("a", ["not xml"]);
        let b = MockTransport::failing("b", TransportError::Unknown("transport down".into()));

        let err = engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap_err();

        assert_eq!(err.transport(), Some("b"));
        assert_eq!(err.kind(), Some(FailureKind::Unknown));
        assert!(err.to_string().contains("transport down"));
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 1);
    }

    #[test]
    fn test_guardrail_then_format_fix() {
        let a = MockTransport::new("a");
        a.push_error(TransportError::GuardrailViolation("refused".into()));
        a.push_response("garbage");
        let b = MockTransport::with_responses("b", ["junk", VALID_RENAME]);

        let result = engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap();

        assert_eq!(result.new_name, "Acme_Invoice.pdf");
        assert_eq!(a.call_count(), 3);
        assert_eq!(b.call_count(), 2);

        let a_calls = a.calls();
        assert_eq!(a_calls[0].purpose, "rename");
        assert_eq!(a_calls[1].purpose, "rename");
        assert_eq!(a_calls[2].purpose, "rename (format fix)");
        assert_eq!(b.calls()[1].purpose, "rename (format fix)");
    }

    #[test]
    fn test_context_window_retry_succeeds() {
        let a = MockTransport::new("a");
        a.push_error(TransportError::ContextWindowExceeded("prompt too long".into()));
        a.push_response(VALID_RENAME);
        let b = MockTransport::with_responses("b", [VALID_RENAME]);

        let result = engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap();

        assert_eq!(result.new_name, "Acme_Invoice.pdf");
        assert_eq!(a.call_count(), 2);
        assert_eq!(b.call_count(), 0);
    }

    #[test]
    fn test_unknown_error_advances_without_retry() {
        let a = MockTransport::failing("a", TransportError::Unknown("connection reset".into()));
        let b = MockTransport::with_responses("b", [VALID_RENAME]);

        engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap();

        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
        assert_eq!(b.calls()[0].purpose, "rename");
    }

    #[test]
    fn test_format_fix_prompt_reaches_fresh_transports() {
        let a = MockTransport::with_responses("a", ["not xml"]);
        let b = MockTransport::with_responses("b", [VALID_RENAME]);

        engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap();

        let b_call = &b.calls()[0];
        assert!(b_call.prompt.contains("Reply with tags only."));
        assert!(b_call.prompt.starts_with(&a.calls()[0].prompt));
    }

    #[test]
    fn test_prompt_echo_triggers_format_fix() {
        let a = MockTransport::with_responses(
            "a",
            [
                "<new_name>x.pdf</new_name><reason>Return only the tags shown below.</reason>",
                VALID_RENAME,
            ],
        );

        let result = engine(&[&a]).rename("old.pdf", &pdf()).unwrap();

        assert_eq!(result.new_name, "Acme_Invoice.pdf");
        assert_eq!(a.calls()[1].purpose, "rename (format fix)");
    }

    #[test]
    fn test_terminal_parse_error_keeps_raw_text() {
        let a = MockTransport::with_responses("a", ["not xml", "still bad"]);

        let err = engine(&[&a]).rename("old.pdf", &pdf()).unwrap_err();

        assert!(matches!(err, EngineError::Parse { .. }));
        assert_eq!(err.kind(), Some(FailureKind::ParseError));
        assert_eq!(err.raw_text(), Some("still bad"));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let a = MockTransport::failing("a", TransportError::GuardrailViolation("no".into()));
        let b = MockTransport::failing("b", TransportError::ContextWindowExceeded("big".into()));

        let err = engine(&[&a, &b]).rename("old.pdf", &pdf()).unwrap_err();

        assert_eq!(err.kind(), Some(FailureKind::ContextWindowExceeded));
        assert_eq!(a.call_count() + b.call_count(), 4);
    }

    #[test]
    fn test_empty_transport_list_fails() {
        let err = Engine::new(Vec::new()).rename("old.pdf", &pdf()).unwrap_err();
        assert!(matches!(err, EngineError::NoTransports));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_rename_sanitizes_filename_and_reason() {
        let a = MockTransport::with_responses(
            "a",
            ["<new_name>Bad Name/?.pdf</new_name><reason>contains   invalid chars</reason>"],
        );

        let result = engine(&[&a]).rename("old.pdf", &FileMetadata::with_extension("pdf")).unwrap();

        assert!(!result.new_name.contains(' '));
        assert!(!result.new_name.contains('/'));
        assert!(!result.new_name.contains('?'));
        assert!(result.new_name.ends_with(".pdf"));
        assert!(result.new_name.chars().count() <= MAX_FILENAME_CHARS);
        assert_eq!(result.reason, "contains invalid chars");
    }

    #[test]
    fn test_rename_normalizes_placeholder_and_extension() {
        let a = MockTransport::with_responses(
            "a",
            [
                "<new_name>report-current_name.pdf.pdf</new_name>",
                "<new_name>Quarterly_Summary</new_name>",
            ],
        );
        let engine = engine(&[&a]);

        let first = engine.rename("report.pdf", &FileMetadata::default()).unwrap();
        assert_eq!(first.new_name, "report.pdf");

        let second = engine.rename("report.pdf", &FileMetadata::default()).unwrap();
        assert_eq!(second.new_name, "Quarterly_Summary.pdf");
    }

    #[test]
    fn test_stem_action_clears_placeholder_reason() {
        let a = MockTransport::with_responses(
            "a",
            ["<stem_action>keep</stem_action><reason>short justification</reason>"],
        );

        let result = engine(&[&a]).stem_action("Report", "NewReport").unwrap();

        assert_eq!(result.stem_action, StemAction::Keep);
        assert_eq!(result.reason, "");
        assert_eq!(a.calls()[0].purpose, "stem action");
    }

    #[test]
    fn test_stem_action_legacy_boolean() {
        let a = MockTransport::with_responses(
            "a",
            ["<keep_original>false</keep_original><reason>stem is a camera counter</reason>"],
        );

        let result = engine(&[&a]).stem_action("IMG_0042", "Beach.jpg").unwrap();

        assert_eq!(result.stem_action, StemAction::Drop);
        assert!(!result.stem_action.keeps_original());
        assert_eq!(result.reason, "stem is a camera counter");
    }

    #[test]
    fn test_sort_canonicalizes_category() {
        let a = MockTransport::with_responses(
            "a",
            ["<category>image</category>", "<category>Spaceship</category>"],
        );
        let engine = engine(&[&a]);
        let allowed = EngineConfig::default_categories();

        let result = engine.sort(&descriptor(), &allowed).unwrap();
        assert_eq!(result.assignments.len(), 1);
        assert_eq!(result.category_for("/inbox/photo.png"), Some("Image"));

        let result = engine.sort(&descriptor(), &allowed).unwrap();
        assert_eq!(result.category_for("/inbox/photo.png"), Some("Other"));
    }

    #[test]
    fn test_sort_requires_categories() {
        let a = MockTransport::with_responses("a", ["<category>Image</category>"]);

        let err = engine(&[&a]).sort(&descriptor(), &[]).unwrap_err();

        assert!(matches!(err, EngineError::Config(_)));
        assert_eq!(a.call_count(), 0);
    }

    #[test]
    fn test_sort_outside_allowed_without_fallback_triggers_format_fix() {
        let a = MockTransport::with_responses(
            "a",
            ["<category>Spaceship</category>", "<category>image</category>"],
        );
        let allowed = vec!["Code".to_string(), "Image".to_string()];

        let result = engine(&[&a]).sort(&descriptor(), &allowed).unwrap();

        assert_eq!(result.category_for("/inbox/photo.png"), Some("Image"));
        let calls = a.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].purpose, "sort (format fix)");
    }

    #[test]
    fn test_sort_never_returns_unoffered_category() {
        let a = MockTransport::with_responses(
            "a",
            ["<category>Spaceship</category>", "<category>Other</category>"],
        );
        let allowed = vec!["Code".to_string(), "Image".to_string()];

        let err = engine(&[&a]).sort(&descriptor(), &allowed).unwrap_err();

        assert_eq!(err.kind(), Some(FailureKind::ParseError));
        assert_eq!(err.raw_text(), Some("<category>Other</category>"));
    }

    #[test]
    fn test_single_line_fenced_answer_needs_no_retry() {
        let a = MockTransport::with_responses(
            "a",
            ["```xml <new_name>Acme_Invoice.pdf</new_name><reason>invoice</reason>```"],
        );

        let result = engine(&[&a]).rename("old.pdf", &pdf()).unwrap();

        assert_eq!(result.new_name, "Acme_Invoice.pdf");
        assert_eq!(a.call_count(), 1);
        assert_eq!(a.calls()[0].purpose, "rename");
    }

    #[test]
    fn test_run_dispatches_on_task() {
        let a = MockTransport::with_responses("a", ["<category>Code</category>"]);
        let task = Task::Sort(SortRequest {
            file: descriptor(),
            allowed_categories: vec!["Code".into(), "Image".into()],
            context: Some("Side projects".into()),
        });

        match engine(&[&a]).run(&task).unwrap() {
            Decision::Sort(result) => {
                assert_eq!(result.category_for("/inbox/photo.png"), Some("Code"))
            }
            other => panic!("unexpected decision: {:?}", other),
        }
        assert!(a.calls()[0].prompt.starts_with("Context: Side projects"));
        assert_eq!(a.calls()[0].purpose, "sort");
    }

    #[test]
    fn test_config_token_budget_and_context() {
        let a = MockTransport::with_responses("a", [VALID_RENAME]);
        let config = EngineConfig {
            rename_max_tokens: 99,
            context: Some("Client ACME".into()),
            ..EngineConfig::default()
        };

        let engine = Engine::with_config(vec![&a as &dyn Transport], config).unwrap();
        engine.rename("old.pdf", &pdf()).unwrap();

        let call = &a.calls()[0];
        assert_eq!(call.max_tokens, 99);
        assert!(call.prompt.starts_with("Context: Client ACME\n"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_filename_chars: 2,
            ..EngineConfig::default()
        };
        let result = Engine::with_config(Vec::new(), config);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_engine_is_stateless_across_runs() {
        let a = MockTransport::with_responses("a", ["not xml", VALID_RENAME, VALID_RENAME]);
        let engine = engine(&[&a]);

        engine.rename("old.pdf", &pdf()).unwrap();
        engine.rename("old.pdf", &pdf()).unwrap();

        let calls = a.calls();
        assert_eq!(calls.len(), 3);
        // The second run starts in normal mode again
        assert_eq!(calls[2].purpose, "rename");
        assert_eq!(engine.transport_names(), vec!["a"]);
    }
}
