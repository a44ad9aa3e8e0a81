#![no_main]

use ironwatch_log_pipeline::rule::RuleLoader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // YAML 파서는 &str을 받으므로 UTF-8 변환 필요
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(rule) = RuleLoader::parse_yaml(yaml_str, "fuzz-input.yml") {
            // 검증을 통과한 규칙은 저장 형태로도 변환되어야 한다
            assert!(rule.to_new_rule().is_ok());
        }
    }
});
