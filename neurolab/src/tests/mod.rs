mod dispatch_tests;
mod fake_fsl;
