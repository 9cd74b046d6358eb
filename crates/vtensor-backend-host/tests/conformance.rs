use std::sync::Arc;

use vtensor_backend_host::HostContext;
use vtensor_ukernel_tests::define_context_tests;

define_context_tests!(host_context, || Arc::new(HostContext::new()));
define_context_tests!(pooled_host_context, || Arc::new(
    HostContext::new()
        .with_name("pooled")
        .with_memory_limit(1 << 20)
));
