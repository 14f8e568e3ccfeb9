//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Concierge Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[gateway]
# host = "0.0.0.0"
# port = 8787
# client_channel_capacity = 256   # 16-65536
# start_timeout_secs = 10         # 1-300
# job_feed_addr = "127.0.0.1:8788"  # job completion feed; keep on loopback

[engine]
# url = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
# model = "models/gemini-2.0-flash-live-001"
# voice = "Aoede"
# api_key_env = "GEMINI_API_KEY"
# connect_timeout_secs = 15       # 1-120

[live]
# greeting_delay_ms = 800         # 0-10000
# tool_domains = ["contacts", "properties", "deals", "tasks", "reports"]
# blocked_source_hosts = []
# metadata_scan_depth = 6         # 1-32
# job_delivery_instruction = "a brief, natural spoken summary"
# include_search = true

[backend]
# url = "http://127.0.0.1:3000/api"
# timeout_secs = 30

[tools]
# catalog = "/etc/concierge/tools.json"

[logging]
# level = "info"                  # trace | debug | info | warn | error
# json = false
"##
    .to_string()
}
