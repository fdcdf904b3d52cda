//! `bdm status <url-file>` – show which URLs the resume record marks completed.

use anyhow::Result;
use bdm_core::job::JobIdScheme;
use bdm_core::resume_record::ResumeRecord;
use bdm_core::url_model::read_url_list;
use std::path::Path;

pub fn run_status(url_file: &Path, download_dir: &Path, job_ids: JobIdScheme) -> Result<()> {
    let urls = read_url_list(url_file)?;
    if urls.is_empty() {
        println!("No URLs in {}.", url_file.display());
        return Ok(());
    }
    let record = ResumeRecord::load_from_path(&ResumeRecord::default_path(download_dir))?.unwrap_or_default();
    let done = completed_flags(&urls, &record, job_ids);

    println!("{:<6} {:<10} {}", "INDEX", "STATE", "URL");
    for (index, (url, completed)) in urls.iter().zip(&done).enumerate() {
        let state = if *completed { "completed" } else { "pending" };
        println!("{:<6} {:<10} {}", index, state, url);
    }
    let count = done.iter().filter(|d| **d).count();
    println!("{} of {} completed", count, urls.len());
    Ok(())
}

/// Whether each URL's job id is in the record.
fn completed_flags(urls: &[String], record: &ResumeRecord, job_ids: JobIdScheme) -> Vec<bool> {
    let id_fn = job_ids.id_fn();
    (0..urls.len())
        .map(|index| record.completed.contains(&id_fn(index, urls)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bdm_core::job::url_digest_job_id;

    fn urls() -> Vec<String> {
        vec!["http://h/a".into(), "http://h/b".into(), "http://h/c".into()]
    }

    #[test]
    fn positional_flags() {
        let record = ResumeRecord::new([0, 2].into_iter().collect());
        assert_eq!(
            completed_flags(&urls(), &record, JobIdScheme::Positional),
            vec![true, false, true]
        );
    }

    #[test]
    fn digest_flags() {
        let list = urls();
        let record = ResumeRecord::new([url_digest_job_id(1, &list)].into_iter().collect());
        assert_eq!(
            completed_flags(&list, &record, JobIdScheme::UrlDigest),
            vec![false, true, false]
        );
    }
}
