mod atomic_file;
pub mod ffmpeg_writer;
pub mod image_file_writer;
pub mod json_result_writer;
