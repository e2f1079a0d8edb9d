pub mod shared {
    pub mod constants;
    pub mod engine_config;
    pub mod engine_error;
    pub mod frame;
    pub mod inference_result;
    pub mod pipeline_settings;
    pub mod snapshot;
    pub mod video_metadata;
}

pub mod capture {
    pub mod domain {
        pub mod frame_source;
        pub mod source_spec;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod domain {
        pub mod pipeline;
        pub mod pipeline_handle;
        pub mod pipeline_registry;
    }
    pub mod infrastructure;
}

pub mod metrics {
    pub mod metrics_aggregator;
}

pub mod export {
    pub mod domain {
        pub mod image_writer;
        pub mod result_writer;
        pub mod video_writer;
    }
    pub mod export_controller;
    pub mod infrastructure;
    pub mod recording_session;
}

pub mod orchestration {
    pub mod command_worker;
    pub mod frame_orchestrator;
    pub mod run_status;
    pub mod snapshot_channel;
}
